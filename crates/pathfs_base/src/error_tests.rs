/* 📖 # Why use a separate file for these error tests?

The span trace test records source locations. Keeping these tests out of error.rs means
edits to the error module don't churn the expectations.
*/

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::{PathfsError, PathfsResult, ResultExt};
    use expect_test::expect;
    use tracing::span;
    use tracing_error::ErrorLayer;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_debug_without_context() {
        let error = PathfsError::new(ErrorKind::DirectoryNotEmpty {
            locator: "file:///tmp/d".to_string(),
        });

        expect![[r#"
            Directory is not empty: file:///tmp/d
        "#]]
        .assert_debug_eq(&error);
    }

    #[test]
    fn test_debug_pretty_print_format() {
        let error = PathfsError::new(ErrorKind::NotFound {
            locator: "mem:/notes/today.md".to_string(),
        })
        .context("while appending")
        .context("in watch handler");

        expect![[r#"
            Entry not found: mem:/notes/today.md
            ├─ while appending
            └─ in watch handler
        "#]]
        .assert_debug_eq(&error);
    }

    #[test]
    fn test_debug_io_cause_chain() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let copy_error = PathfsError::from_io("file:///srv/in/a.txt", io_error)
            .context("reading source");
        let error = PathfsError::message("copy to mem:/out/a.txt failed")
            .context("copying mem:/out")
            .caused_by(copy_error);

        expect![[r#"
            copy to mem:/out/a.txt failed
            ├─ copying mem:/out
            └─ cause: Permission denied: file:///srv/in/a.txt
               └─ reading source
        "#]]
        .assert_debug_eq(&error);
    }

    #[test]
    fn test_root_cause_walks_to_innermost() {
        let innermost = PathfsError::new(ErrorKind::NotFound {
            locator: "mem:/a".to_string(),
        });
        let middle = PathfsError::message("rename failed").caused_by(innermost);
        let outer = PathfsError::message("move failed").caused_by(middle);

        assert_eq!(outer.root_cause().to_string(), "Entry not found: mem:/a");
        assert!(!outer.is_not_found());
        assert!(outer.cause().is_some_and(|cause| cause.cause().is_some()));
    }

    #[test]
    fn test_result_context_shows_up_in_debug() {
        let result: PathfsResult<()> = Err(ErrorKind::SchemeUnsupported {
            scheme: "ftp".to_string(),
        }
        .into());
        let error = result.context("stat ftp://host/a").unwrap_err();

        expect![[r#"
            No file system provider registered for scheme 'ftp'
            └─ stat ftp://host/a
        "#]]
        .assert_debug_eq(&error);
    }

    #[test]
    fn test_span_trace_is_captured_with_error_layer() {
        let subscriber = tracing_subscriber::registry().with(ErrorLayer::default());
        tracing::subscriber::with_default(subscriber, || {
            let operation_span = span!(tracing::Level::DEBUG, "copy_entry", attempt = 1);
            let _guard = operation_span.enter();

            let error = PathfsError::message("copy failed");
            let debug = format!("{:?}", error);
            assert!(debug.starts_with("copy failed\nTrace:"), "{}", debug);
            assert!(debug.contains("copy_entry"), "{}", debug);
        });
    }

    #[test]
    fn test_no_span_trace_without_subscriber() {
        let error = PathfsError::message("plain");
        assert_eq!(format!("{:?}", error), "plain");
    }
}
