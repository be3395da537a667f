/// Creates an anyhow error tagged with the current file and line number
#[macro_export]
macro_rules! file_error {
    ($($arg:tt)*) => {
        anyhow::anyhow!(
            "[{}:{}] {}",
            std::path::Path::new(file!())
                .file_name()
                .map(|f| f.to_string_lossy())
                .unwrap_or_default(),
            line!(),
            format!($($arg)*)
        )
    };
}

/// Creates an anyhow error tagged with the current file and line number, and includes a source error
#[macro_export]
macro_rules! file_error_with_source {
    ($source:expr, $($arg:tt)*) => {
        anyhow::anyhow!(
            "[{}:{}] {}: {}",
            std::path::Path::new(file!())
                .file_name()
                .map(|f| f.to_string_lossy())
                .unwrap_or_default(),
            line!(),
            format!($($arg)*),
            $source
        )
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn file_error_names_the_file() {
        let err = file_error!("bad frame {}", 7);
        assert!(err.to_string().starts_with("[error.rs:"));
        assert!(err.to_string().ends_with("bad frame 7"));
    }

    #[test]
    fn file_error_with_source_appends_source() {
        let source = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let err = file_error_with_source!(source, "reading {}", "/dev/ttyUSB0");
        assert!(err.to_string().ends_with("reading /dev/ttyUSB0: timed out"));
    }
}
