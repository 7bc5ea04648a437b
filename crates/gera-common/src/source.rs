//! Registry of the source files a compilation run reads.

use rustc_hash::FxHashMap;

use crate::span::{FileId, LineIndex, Span};

#[derive(Debug)]
pub struct SourceFile {
    pub name: String,
    pub text: String,
    pub lines: LineIndex,
}

/// Owns every source file's text, addressable by [`FileId`] or by name.
#[derive(Debug, Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
    by_name: FxHashMap<String, FileId>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file. Adding the same name twice replaces its text but
    /// keeps the original id.
    pub fn add(&mut self, name: impl Into<String>, text: impl Into<String>) -> FileId {
        let name = name.into();
        let text = text.into();
        let lines = LineIndex::new(&text);
        if let Some(&id) = self.by_name.get(&name) {
            let file = &mut self.files[id.0 as usize];
            file.text = text;
            file.lines = lines;
            return id;
        }
        let id = FileId(self.files.len() as u32);
        self.by_name.insert(name.clone(), id);
        self.files.push(SourceFile { name, text, lines });
        id
    }

    pub fn get(&self, id: FileId) -> Option<&SourceFile> {
        self.files.get(id.0 as usize)
    }

    pub fn lookup(&self, name: &str) -> Option<FileId> {
        self.by_name.get(name).copied()
    }

    /// Text covered by `span`, if the file is known and the span is in bounds.
    pub fn snippet(&self, span: Span) -> Option<&str> {
        self.get(span.file)?
            .text
            .get(span.start as usize..span.end as usize)
    }

    /// Human readable `name:line:col` for the start of `span`.
    pub fn location(&self, span: Span) -> String {
        match self.get(span.file) {
            Some(file) => {
                let (line, col) = file.lines.line_col(span.start);
                format!("{}:{}:{}", file.name, line, col)
            }
            None => format!("<unknown>:{}", span.start),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (FileId, &SourceFile)> {
        self.files
            .iter()
            .enumerate()
            .map(|(i, file)| (FileId(i as u32), file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_lookup() {
        let mut map = SourceMap::new();
        let a = map.add("a.gera", "proc main() {}");
        let b = map.add("b.gera", "mut x = 1");
        assert_ne!(a, b);
        assert_eq!(map.lookup("b.gera"), Some(b));
        assert_eq!(map.snippet(Span::new(b, 4, 5)), Some("x"));
    }

    #[test]
    fn re_adding_keeps_id() {
        let mut map = SourceMap::new();
        let a = map.add("a.gera", "old");
        let again = map.add("a.gera", "new\ntext");
        assert_eq!(a, again);
        assert_eq!(map.location(Span::new(a, 4, 5)), "a.gera:2:1");
    }

    #[test]
    fn snippet_out_of_bounds() {
        let mut map = SourceMap::new();
        let a = map.add("a.gera", "abc");
        assert_eq!(map.snippet(Span::new(a, 2, 10)), None);
        assert_eq!(map.snippet(Span::new(FileId(9), 0, 1)), None);
    }
}
