//! Pre-cleaning of pasted profile text before extraction.

/// Normalizes line endings to `\n`, collapses runs of spaces and tabs to a
/// single space, trims every line and drops blank lines.
pub fn clean_profile_text(raw: &str) -> String {
    raw.replace("\r\n", "\n")
        .replace('\r', "\n")
        .lines()
        .map(|line| {
            line.split([' ', '\t'])
                .filter(|word| !word.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_endings_and_blank_lines() {
        let raw = "John Smith\r\n\r\n\r\nBorn 1850\rDied 1920\n\n";
        assert_eq!(clean_profile_text(raw), "John Smith\nBorn 1850\nDied 1920");
    }

    #[test]
    fn test_whitespace_runs_collapse() {
        let raw = "  Birth \t\t 12 May   1850  \n   \t  \nLondon,    England";
        assert_eq!(clean_profile_text(raw), "Birth 12 May 1850\nLondon, England");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(clean_profile_text(""), "");
        assert_eq!(clean_profile_text(" \n\t\r\n"), "");
    }
}
