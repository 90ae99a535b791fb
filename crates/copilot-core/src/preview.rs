use crate::segment::{segment, Span};

/// Languages whose blocks open the preview panel automatically.
pub const PREVIEW_LANGUAGES: &[&str] = &[
    "html",
    "javascript",
    "jsx",
    "css",
    "python",
    "java",
    "cpp",
    "c",
    "json",
    "xml",
    "sql",
];

pub fn is_previewable(language: &str) -> bool {
    PREVIEW_LANGUAGES.contains(&language)
}

/// Content of the first closed block tagged with a previewable language.
pub fn scan(text: &str) -> Option<&str> {
    segment(text).into_iter().find_map(|span| match span {
        Span::Code(code) if code.terminated && is_previewable(code.language) => Some(code.content),
        _ => None,
    })
}

/// The side preview panel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preview {
    pub code: String,
    pub visible: bool,
}

impl Preview {
    pub fn show(&mut self, code: impl Into<String>) {
        self.code = code.into();
        self.visible = true;
    }

    /// Toggle visibility. The panel cannot be shown while it has no code.
    pub fn toggle(&mut self) -> bool {
        self.visible = !self.visible && !self.code.is_empty();
        self.visible
    }

    pub fn clear(&mut self) {
        self.code.clear();
        self.visible = false;
    }
}
