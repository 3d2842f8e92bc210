use regex::Regex;

/// Regex-backed text normalisation shared by the keyword and sentiment passes.
#[derive(Debug, Clone)]
pub struct TextCleaner {
    url: Regex,
    mention: Regex,
    latin: Regex,
    non_han: Regex,
}

impl TextCleaner {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            url: Regex::new(r"http\S+")?,
            mention: Regex::new(r"@\w+")?,
            latin: Regex::new(r"[a-zA-Z0-9]+")?,
            non_han: Regex::new(r"[^\x{4e00}-\x{9fa5}]+")?,
        })
    }

    /// Drop links and @mentions, trim what is left.
    pub fn strip_links(&self, text: &str) -> String {
        let text = self.url.replace_all(text, "");
        let text = self.mention.replace_all(&text, "");
        text.trim().to_string()
    }

    /// Keep only CJK unified ideographs; every other run becomes one space.
    ///
    /// Latin letters and digits are removed outright (not spaced), so Han
    /// characters on either side of them join up.
    pub fn han_only(&self, text: &str) -> String {
        let text = self.url.replace_all(text, "");
        let text = self.latin.replace_all(&text, "");
        let text = self.non_han.replace_all(&text, " ");
        text.trim().to_string()
    }
}
