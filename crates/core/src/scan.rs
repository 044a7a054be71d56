//! Line-oriented scanner for uniform and attribute declarations.
//!
//! Only three line-start forms are recognized, each starting at column 0:
//!
//! - `uniform <type> <name>[;=...]`
//! - `layout(location = N) in <type> <name>;`
//! - `attribute <type> <name>;`
//!
//! Anything else (indented declarations, interface blocks, multi-line
//! declarations) is invisible. This is not a GLSL parser.

use serde::Serialize;

/// A declared uniform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UniformDescriptor {
    pub name: String,
    /// GLSL type as written, e.g. `vec3` or `sampler2D`.
    pub type_tag: String,
    /// Declared array length, `0` for a scalar.
    pub array_length: usize,
}

/// A declared vertex attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeDescriptor {
    pub name: String,
    pub type_tag: String,
    /// Explicit location from a layout qualifier; `None` for the legacy form.
    pub location: Option<u32>,
}

/// Everything the scanner found in one source text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Declarations {
    pub uniforms: Vec<UniformDescriptor>,
    pub attributes: Vec<AttributeDescriptor>,
}

/// Scans `source` line by line.
pub fn scan(source: &str) -> Declarations {
    let mut declarations = Declarations::default();
    for line in source.lines() {
        if line.starts_with("uniform") {
            if let Some(uniform) = parse_uniform(line) {
                declarations.uniforms.push(uniform);
            }
        } else if line.starts_with("layout") {
            if let Some(attribute) = parse_layout_input(line) {
                declarations.attributes.push(attribute);
            }
        } else if line.starts_with("attribute") {
            if let Some(attribute) = parse_legacy_attribute(line) {
                declarations.attributes.push(attribute);
            }
        }
    }
    declarations
}

fn parse_uniform(line: &str) -> Option<UniformDescriptor> {
    let mut tokens = line
        .split([' ', ';', '='])
        .skip(1)
        .map(str::trim)
        .filter(|t| !t.is_empty());
    let type_tag = tokens.next()?;
    let raw_name = tokens.next()?;
    let (name, array_length) = split_array_suffix(raw_name);
    Some(UniformDescriptor {
        name: name.to_string(),
        type_tag: type_tag.to_string(),
        array_length,
    })
}

fn parse_layout_input(line: &str) -> Option<AttributeDescriptor> {
    let open = "layout".len();
    let start = line.find('=')?;
    let end = line.find(')')?;
    if start <= open || end <= start {
        return None;
    }
    let location = line[start + 1..end].trim().parse::<u32>().ok()?;

    let rest = &line[end + 1..];
    let input = rest.find("in ")?;
    let mut tokens = rest[input + 3..]
        .split([' ', ';'])
        .map(str::trim)
        .filter(|t| !t.is_empty());
    let type_tag = tokens.next()?;
    let name = tokens.next()?;
    Some(AttributeDescriptor {
        name: name.to_string(),
        type_tag: type_tag.to_string(),
        location: Some(location),
    })
}

fn parse_legacy_attribute(line: &str) -> Option<AttributeDescriptor> {
    let rest = line.strip_prefix("attribute ")?;
    let mut tokens = rest
        .split([' ', ';'])
        .map(str::trim)
        .filter(|t| !t.is_empty());
    let type_tag = tokens.next()?;
    let name = tokens.next()?;
    Some(AttributeDescriptor {
        name: name.to_string(),
        type_tag: type_tag.to_string(),
        location: None,
    })
}

/// Splits `name[N]` into `("name", N)`. Names without a well-formed suffix
/// are returned unchanged with length `0`.
pub fn split_array_suffix(name: &str) -> (&str, usize) {
    if let Some(open) = name.find('[') {
        if let Some(inner) = name[open + 1..].strip_suffix(']') {
            if let Ok(length) = inner.trim().parse::<usize>() {
                return (&name[..open], length);
            }
        }
    }
    (name, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_with_semicolon() {
        let d = scan("uniform vec3 color;");
        assert_eq!(
            d.uniforms,
            vec![UniformDescriptor {
                name: "color".into(),
                type_tag: "vec3".into(),
                array_length: 0,
            }]
        );
    }

    #[test]
    fn uniform_with_initializer_and_extra_spaces() {
        let d = scan("uniform  float   speed=1.5;");
        assert_eq!(d.uniforms[0].name, "speed");
        assert_eq!(d.uniforms[0].type_tag, "float");
    }

    #[test]
    fn uniform_array_length_is_parsed() {
        let d = scan("uniform vec3 _lightPosition[4];");
        assert_eq!(d.uniforms[0].name, "_lightPosition");
        assert_eq!(d.uniforms[0].array_length, 4);
    }

    #[test]
    fn indented_declarations_are_invisible() {
        let d = scan("  uniform float hidden;\n\tlayout(location = 1) in vec2 uv;");
        assert!(d.uniforms.is_empty());
        assert!(d.attributes.is_empty());
    }

    #[test]
    fn layout_input_yields_location() {
        let d = scan("layout(location = 2) in vec3 foo;");
        assert_eq!(
            d.attributes,
            vec![AttributeDescriptor {
                name: "foo".into(),
                type_tag: "vec3".into(),
                location: Some(2),
            }]
        );
    }

    #[test]
    fn layout_output_and_blocks_are_ignored() {
        let source = "layout(location = 0) out vec4 fragColor;\nlayout(std140) uniform Block {";
        let d = scan(source);
        assert!(d.attributes.is_empty(), "got: {:?}", d.attributes);
        assert!(d.uniforms.is_empty());
    }

    #[test]
    fn layout_with_non_numeric_location_is_ignored() {
        let d = scan("layout(location = N) in vec3 foo;");
        assert!(d.attributes.is_empty());
    }

    #[test]
    fn legacy_attribute_has_no_location() {
        let d = scan("attribute vec4 color;");
        assert_eq!(d.attributes[0].name, "color");
        assert_eq!(d.attributes[0].type_tag, "vec4");
        assert_eq!(d.attributes[0].location, None);
    }

    #[test]
    fn crlf_line_endings_are_tolerated() {
        let d = scan("uniform int count;\r\nattribute float weight;\r\n");
        assert_eq!(d.uniforms[0].name, "count");
        assert_eq!(d.attributes[0].name, "weight");
    }

    #[test]
    fn truncated_declarations_are_skipped() {
        let d = scan("uniform float\nattribute vec3\nlayout(location = 3) in");
        assert_eq!(d, Declarations::default());
    }

    #[test]
    fn split_array_suffix_handles_malformed_names() {
        assert_eq!(split_array_suffix("plain"), ("plain", 0));
        assert_eq!(split_array_suffix("arr[3]"), ("arr", 3));
        assert_eq!(split_array_suffix("arr[]"), ("arr[]", 0));
        assert_eq!(split_array_suffix("arr[n]"), ("arr[n]", 0));
    }

    mod proptests {
        use super::super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn scanner_never_panics(source in "\\PC{0,200}") {
                let _ = scan(&source);
            }

            #[test]
            fn generated_uniforms_round_trip(
                ty in "(int|float|vec2|vec3|vec4|mat4|sampler2D)",
                name in "[a-zA-Z_][a-zA-Z0-9_]{0,12}",
            ) {
                let d = scan(&format!("uniform {ty} {name};"));
                prop_assert_eq!(d.uniforms.len(), 1);
                prop_assert_eq!(&d.uniforms[0].type_tag, &ty);
                prop_assert_eq!(&d.uniforms[0].name, &name);
            }
        }
    }
}
