//! # Utility Functions Module
//!
//! Small helpers shared by the tool wrappers: argument list building and
//! diagnostic text handling.

/// Converts any iterable of string-like items to `Vec<String>`.
///
/// Used to assemble command lines for the external tools without a
/// `.to_string()` on every element.
///
/// # Example
/// ```rust,ignore
/// use crate::utils::to_string_vec;
///
/// let args = to_string_vec(["-f", "mp3", "-q:a", "2"]);
///
/// // Also works with mixed types:
/// let rate = 44100;
/// let args = to_string_vec(["-ar", &rate.to_string()]);
/// ```
pub fn to_string_vec<T, I>(items: I) -> Vec<String>
where
    T: ToString,
    I: IntoIterator<Item = T>,
{
    items.into_iter().map(|item| item.to_string()).collect()
}

/// Macro for even more convenient argument building.
///
/// Items may have different types; each is converted with `ToString`.
///
/// # Example
/// ```rust,ignore
/// use crate::args;
///
/// let start = 1.5;
/// let args = args!["-ss", start, "-i", "pipe:"];
/// ```
#[macro_export]
macro_rules! args {
    [$($item:expr),* $(,)?] => {
        ::std::vec![$(::std::string::ToString::to_string(&$item)),*]
    };
}

/// Returns the first line of `text` that is not blank, trimmed.
pub fn first_non_empty_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|line| !line.is_empty())
}

/// Formats a float the shortest way that round-trips (`2.0` -> `"2"`).
pub fn format_float(value: f64) -> String {
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_string_vec_string_literals() {
        let result = to_string_vec(["-i", "pipe:"]);
        assert_eq!(result, vec!["-i".to_string(), "pipe:".to_string()]);
    }

    #[test]
    fn test_to_string_vec_empty() {
        let result: Vec<String> = to_string_vec(Vec::<&str>::new());
        assert_eq!(result, Vec::<String>::new());
    }

    #[test]
    fn test_args_macro() {
        let rate = 48000;
        let result = args!["-ar", rate, "pipe:"];
        assert_eq!(result, vec!["-ar".to_string(), "48000".to_string(), "pipe:".to_string()]);
    }

    #[test]
    fn test_first_non_empty_line() {
        assert_eq!(first_non_empty_line("\n  \n  Invalid data found  \nsecond"), Some("Invalid data found"));
        assert_eq!(first_non_empty_line(" \n\t\n"), None);
        assert_eq!(first_non_empty_line(""), None);
    }

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(2.0), "2");
        assert_eq!(format_float(0.5), "0.5");
        assert_eq!(format_float(29.97), "29.97");
    }
}
