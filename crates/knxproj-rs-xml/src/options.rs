// crates/knxproj-rs-xml/src/options.rs

/// Options controlling a single parse invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Locale used for translated texts (e.g. `de-DE`). `None` keeps the
    /// base texts of the documents.
    pub language: Option<String>,
    /// Resolve parameter memory layouts for every device.
    pub parameterize: bool,
    /// Run independent passes on scoped threads.
    pub parallel: bool,
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn language(mut self, language: &str) -> Self {
        self.language = Some(language.to_string());
        self
    }

    pub fn parameterize(mut self, parameterize: bool) -> Self {
        self.parameterize = parameterize;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}
