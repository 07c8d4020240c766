const INDENT: &str = "    ";

/// Line-oriented builder for generated source text.
#[derive(Debug, Default)]
pub(crate) struct SourceWriter {
    out: String,
}

impl SourceWriter {
    pub(crate) fn line(&mut self, depth: usize, text: impl AsRef<str>) {
        for _ in 0..depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    pub(crate) fn blank(&mut self) {
        self.out.push('\n');
    }

    /// Append pre-rendered lines verbatim.
    pub(crate) fn raw(&mut self, text: &str) {
        self.out.push_str(text);
    }

    pub(crate) fn finish(self) -> String {
        self.out
    }
}
