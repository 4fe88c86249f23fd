use std::borrow::Cow;

/// Return the input string with an added "s" at the end if `count` is larger than one and non-zero.
pub fn pluralize(value: &str, count: usize) -> Cow<'_, str> {
    if count == 1 {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(format!("{value}s"))
    }
}

/// Truncates the middle of a string so that it's total length doesn't exceed `length`.
/// `length` has to be at least five, otherwise there wouldn't be space for `...`.
pub fn truncate_middle(value: &str, length: usize) -> Cow<'_, str> {
    assert!(length >= 5);

    if value.chars().count() <= length {
        value.into()
    } else {
        let chars: Vec<char> = value.chars().collect();
        let length = length - 3; // space for ...
        let half = length as f64 / 2.0;
        let start = half.ceil() as usize;
        let end = half.floor() as usize;
        let head: String = chars[..start].iter().collect();
        let tail: String = chars[chars.len() - end..].iter().collect();
        format!("{head}...{tail}").into()
    }
}

#[cfg(test)]
mod tests {
    use super::{pluralize, truncate_middle};
    use std::borrow::Cow;

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize("chunk", 0), "chunks");
        assert_eq!(pluralize("chunk", 1), "chunk");
        assert_eq!(pluralize("chunk", 3), "chunks");
    }

    #[test]
    fn test_truncate_middle_short() {
        assert_eq!(truncate_middle("abcde", 5), Cow::from("abcde"));
    }

    #[test]
    fn test_truncate_middle_long() {
        assert_eq!(truncate_middle("abcdef", 5), Cow::from("a...f"));
    }
}
