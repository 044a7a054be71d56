//! Shader packs: every stage of a program in one text file.
//!
//! ```text
//! [vertex shader]
//! ...
//! [fragment shader]
//! ...
//! ```
//!
//! A stage's text runs until the next header line. Headers match
//! case-insensitively after trimming. Empty stages are left out on save.

use std::path::Path;

use crate::error::EngineError;
use crate::program::ProgramModel;
use crate::recycle::RecycleBin;
use crate::stage::StageKind;

fn header(kind: StageKind) -> &'static str {
    match kind {
        StageKind::Vertex => "[vertex shader]",
        StageKind::TessControl => "[tessctrl shader]",
        StageKind::TessEval => "[tesseval shader]",
        StageKind::Geometry => "[geometry shader]",
        StageKind::Fragment => "[fragment shader]",
    }
}

fn parse_header(line: &str) -> Option<StageKind> {
    let line = line.trim().to_ascii_lowercase();
    StageKind::ALL.into_iter().find(|&kind| header(kind) == line)
}

/// Stage sources read from or written to a pack file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderPack {
    sources: [String; 5],
}

impl ShaderPack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(&self, kind: StageKind) -> &str {
        &self.sources[kind.index()]
    }

    pub fn set_source(&mut self, kind: StageKind, source: impl Into<String>) {
        self.sources[kind.index()] = source.into();
    }

    /// Parses pack text. Non-blank text before the first header and a
    /// repeated header are errors.
    pub fn parse(text: &str) -> Result<Self, EngineError> {
        let mut pack = Self::new();
        let mut seen = [false; 5];
        let mut current: Option<StageKind> = None;
        let mut buffer = String::new();

        for (number, line) in text.lines().enumerate() {
            if let Some(kind) = parse_header(line) {
                if let Some(open) = current {
                    pack.set_source(open, finish(&buffer));
                }
                if std::mem::replace(&mut seen[kind.index()], true) {
                    return Err(EngineError::InvalidDocument(format!(
                        "line {}: duplicate section {}",
                        number + 1,
                        header(kind)
                    )));
                }
                current = Some(kind);
                buffer.clear();
                continue;
            }
            if current.is_none() {
                if !line.trim().is_empty() {
                    return Err(EngineError::InvalidDocument(format!(
                        "line {}: text before the first section header",
                        number + 1
                    )));
                }
                continue;
            }
            buffer.push_str(line);
            buffer.push('\n');
        }
        if let Some(open) = current {
            pack.set_source(open, finish(&buffer));
        }
        Ok(pack)
    }

    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for kind in StageKind::ALL {
            let source = self.source(kind).trim_end();
            if source.trim().is_empty() {
                continue;
            }
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&format!("{}\n{source}\n", header(kind)));
        }
        text
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        std::fs::write(path, self.to_text())?;
        Ok(())
    }

    pub fn from_program(program: &ProgramModel) -> Self {
        let mut pack = Self::new();
        for kind in StageKind::ALL {
            pack.set_source(kind, program.source(kind));
        }
        pack
    }

    /// Replaces every stage of `program`, including clearing stages the
    /// pack leaves out. Returns whether anything changed.
    pub fn apply(&self, program: &mut ProgramModel, bin: &mut RecycleBin) -> bool {
        let mut changed = false;
        for kind in StageKind::ALL {
            changed |= program.set_source(kind, self.source(kind), bin);
        }
        changed
    }
}

/// Section text without leading blank lines or trailing whitespace.
fn finish(buffer: &str) -> String {
    let start = buffer
        .lines()
        .take_while(|l| l.trim().is_empty())
        .map(|l| l.len() + 1)
        .sum::<usize>()
        .min(buffer.len());
    let body = buffer[start..].trim_end();
    if body.is_empty() {
        String::new()
    } else {
        format!("{body}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PACK: &str = "[vertex shader]
#version 330
layout(location = 0) in vec3 _meshVertex;
void main() {}

[Fragment Shader]

uniform vec4 color;
void main() {}
";

    #[test]
    fn parses_sections_until_next_header() {
        let pack = ShaderPack::parse(PACK).unwrap();
        assert_eq!(
            pack.source(StageKind::Vertex),
            "#version 330\nlayout(location = 0) in vec3 _meshVertex;\nvoid main() {}\n"
        );
        assert_eq!(
            pack.source(StageKind::Fragment),
            "uniform vec4 color;\nvoid main() {}\n"
        );
        assert_eq!(pack.source(StageKind::Geometry), "");
    }

    #[test]
    fn save_omits_empty_stages_and_reparses() {
        let pack = ShaderPack::parse(PACK).unwrap();
        let text = pack.to_text();
        assert!(!text.contains("[geometry shader]"));
        assert!(text.starts_with("[vertex shader]\n"));
        assert!(text.contains("\n\n[fragment shader]\n"));
        assert_eq!(ShaderPack::parse(&text).unwrap(), pack);
    }

    #[test]
    fn to_text_writes_each_header_above_its_trimmed_source() {
        let pack = ShaderPack::parse(PACK).unwrap();
        assert_eq!(
            pack.to_text(),
            "[vertex shader]\n#version 330\nlayout(location = 0) in vec3 _meshVertex;\nvoid main() {}\n\n\
             [fragment shader]\nuniform vec4 color;\nvoid main() {}\n"
        );
    }

    #[test]
    fn text_before_first_header_is_rejected() {
        let err = ShaderPack::parse("void main() {}\n[vertex shader]\n").unwrap_err();
        assert!(err.to_string().contains("line 1"), "got: {err}");
    }

    #[test]
    fn duplicate_section_is_rejected() {
        let err = ShaderPack::parse("[vertex shader]\na\n[vertex shader]\nb\n").unwrap_err();
        assert!(err.to_string().contains("line 3"), "got: {err}");
    }

    #[test]
    fn empty_text_is_an_empty_pack() {
        assert_eq!(ShaderPack::parse("\n\n").unwrap(), ShaderPack::new());
        assert_eq!(ShaderPack::new().to_text(), "");
    }

    #[test]
    fn tessellation_headers_map_to_their_stages() {
        let pack =
            ShaderPack::parse("[tessctrl shader]\nA\n[tesseval shader]\nB\n").unwrap();
        assert_eq!(pack.source(StageKind::TessControl), "A\n");
        assert_eq!(pack.source(StageKind::TessEval), "B\n");
    }

    #[test]
    fn apply_replaces_all_program_stages() {
        let mut bin = RecycleBin::new();
        let mut program = ProgramModel::new();
        program.set_source(StageKind::Geometry, "old", &mut bin);
        let pack = ShaderPack::parse(PACK).unwrap();
        assert!(pack.apply(&mut program, &mut bin));
        assert!(program.stage(StageKind::Geometry).is_empty());
        assert!(program.is_link_eligible());
        assert_eq!(ShaderPack::from_program(&program), pack);
    }

    #[test]
    fn pack_file_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("effect.glsl");
        let pack = ShaderPack::parse(PACK).unwrap();
        pack.save(&path).unwrap();
        assert_eq!(ShaderPack::load(&path).unwrap(), pack);
        assert!(ShaderPack::load(&dir.path().join("missing.glsl")).is_err());
    }
}
