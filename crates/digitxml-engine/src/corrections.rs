//! Declarative corrections compiled to an XSLT stylesheet.
//!
//! Corrections targeting the same match pattern are merged into a single
//! template so that they compose instead of overriding each other.

use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::Script;

/// One attribute or text edit applied to every element matching `pattern`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Correction {
    /// Sets (or adds) an attribute.
    SetAttribute {
        /// XSLT match pattern.
        #[serde(rename = "match")]
        pattern: String,
        /// Attribute name.
        name: String,
        /// New value.
        value: String,
    },
    /// Removes an attribute.
    RemoveAttribute {
        /// XSLT match pattern.
        #[serde(rename = "match")]
        pattern: String,
        /// Attribute name.
        name: String,
    },
    /// Renames an attribute, keeping its value.
    RenameAttribute {
        /// XSLT match pattern.
        #[serde(rename = "match")]
        pattern: String,
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// Replaces all element content with text.
    SetText {
        /// XSLT match pattern.
        #[serde(rename = "match")]
        pattern: String,
        /// Replacement text.
        text: String,
    },
}

impl Correction {
    fn pattern(&self) -> &str {
        match self {
            Self::SetAttribute { pattern, .. }
            | Self::RemoveAttribute { pattern, .. }
            | Self::RenameAttribute { pattern, .. }
            | Self::SetText { pattern, .. } => pattern,
        }
    }

    fn names(&self) -> Vec<&str> {
        match self {
            Self::SetAttribute { name, .. } | Self::RemoveAttribute { name, .. } => {
                vec![name.as_str()]
            }
            Self::RenameAttribute { from, to, .. } => vec![from.as_str(), to.as_str()],
            Self::SetText { .. } => Vec::new(),
        }
    }
}

/// A correction list that cannot be compiled.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CorrectionError {
    /// No corrections were supplied.
    #[error("no corrections supplied")]
    Empty,
    /// A match pattern is blank.
    #[error("correction match pattern must not be empty")]
    EmptyPattern,
    /// An attribute name is not a usable XML name.
    #[error("invalid attribute name '{name}'")]
    InvalidName {
        /// Offending name.
        name: String,
    },
}

/// Compiles corrections into an XSLT 1.0 script.
///
/// # Errors
///
/// Returns [`CorrectionError`] for an empty list, a blank pattern or an
/// attribute name that is not a plain XML name.
pub fn corrections_script(corrections: &[Correction]) -> Result<Script, CorrectionError> {
    corrections_stylesheet(corrections).map(Script::xslt)
}

/// Compiles corrections into XSLT 1.0 source.
///
/// # Errors
///
/// See [`corrections_script`].
pub fn corrections_stylesheet(corrections: &[Correction]) -> Result<String, CorrectionError> {
    if corrections.is_empty() {
        return Err(CorrectionError::Empty);
    }
    for correction in corrections {
        if correction.pattern().trim().is_empty() {
            return Err(CorrectionError::EmptyPattern);
        }
        if let Some(bad) = correction.names().into_iter().find(|name| !is_xml_name(name)) {
            return Err(CorrectionError::InvalidName {
                name: bad.to_owned(),
            });
        }
    }

    let mut groups: Vec<(&str, Vec<&Correction>)> = Vec::new();
    for correction in corrections {
        let pattern = correction.pattern();
        if let Some((_, members)) = groups.iter_mut().find(|(existing, _)| *existing == pattern) {
            members.push(correction);
            continue;
        }
        groups.push((pattern, vec![correction]));
    }

    let mut out = String::from(concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
        "<xsl:stylesheet version=\"1.0\" xmlns:xsl=\"http://www.w3.org/1999/XSL/Transform\">\n",
        "  <xsl:template match=\"@*|node()\">\n",
        "    <xsl:copy><xsl:apply-templates select=\"@*|node()\"/></xsl:copy>\n",
        "  </xsl:template>\n",
    ));
    for (pattern, members) in groups {
        write_template(&mut out, pattern, &members);
    }
    out.push_str("</xsl:stylesheet>\n");
    Ok(out)
}

fn write_template(out: &mut String, pattern: &str, members: &[&Correction]) {
    let mut replaced: Vec<&str> = Vec::new();
    let mut text: Option<&str> = None;
    let mut added: Vec<String> = Vec::new();
    for correction in members {
        match correction {
            Correction::SetAttribute { name, value, .. } => {
                replaced.push(name);
                added.push(format!(
                    "<xsl:attribute name=\"{name}\">{}</xsl:attribute>",
                    escape(value.as_str())
                ));
            }
            Correction::RemoveAttribute { name, .. } => replaced.push(name),
            Correction::RenameAttribute { from, to, .. } => {
                replaced.push(from);
                replaced.push(to);
                added.push(format!(
                    "<xsl:if test=\"@{from}\"><xsl:attribute name=\"{to}\">\
                     <xsl:value-of select=\"@{from}\"/></xsl:attribute></xsl:if>"
                ));
            }
            Correction::SetText { text: value, .. } => text = Some(value.as_str()),
        }
    }

    let kept = if replaced.is_empty() {
        "@*".to_owned()
    } else {
        let excluded: Vec<String> = replaced
            .iter()
            .map(|name| format!("name()='{name}'"))
            .collect();
        format!("@*[not({})]", excluded.join(" or "))
    };
    let content = text.map_or_else(
        || "<xsl:apply-templates select=\"node()\"/>".to_owned(),
        |value| format!("<xsl:text>{}</xsl:text>", escape(value)),
    );

    out.push_str(&format!("  <xsl:template match=\"{}\">\n", escape(pattern)));
    out.push_str("    <xsl:copy>\n");
    out.push_str(&format!("      <xsl:apply-templates select=\"{kept}\"/>\n"));
    for line in added {
        out.push_str(&format!("      {line}\n"));
    }
    out.push_str(&format!("      {content}\n"));
    out.push_str("    </xsl:copy>\n  </xsl:template>\n");
}

fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_alphabetic() || first == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::document::XmlDocument;

    fn set(pattern: &str, name: &str, value: &str) -> Correction {
        Correction::SetAttribute {
            pattern: pattern.to_owned(),
            name: name.to_owned(),
            value: value.to_owned(),
        }
    }

    #[test]
    fn generated_stylesheet_is_well_formed() {
        let stylesheet = corrections_stylesheet(&[
            set("item[@unit='g']", "unit", "gram & more"),
            Correction::RenameAttribute {
                pattern: "measure".to_owned(),
                from: "quantLow".to_owned(),
                to: "quantMin".to_owned(),
            },
            Correction::SetText {
                pattern: "title".to_owned(),
                text: "A < B".to_owned(),
            },
        ])
        .expect("compile");
        let parsed = XmlDocument::parse(&stylesheet).expect("stylesheet parses as XML");
        assert_eq!(parsed.root().name(), "xsl:stylesheet");
        assert_eq!(parsed.root().child_elements().count(), 4);
        assert!(stylesheet.contains("gram &amp; more"));
        assert!(stylesheet.contains("A &lt; B"));
    }

    #[test]
    fn corrections_on_one_pattern_share_a_template() {
        let stylesheet = corrections_stylesheet(&[
            set("item", "a", "1"),
            Correction::RemoveAttribute {
                pattern: "item".to_owned(),
                name: "b".to_owned(),
            },
        ])
        .expect("compile");
        assert_eq!(stylesheet.matches("match=\"item\"").count(), 1);
        assert!(stylesheet.contains("@*[not(name()='a' or name()='b')]"));
    }

    #[rstest]
    #[case(Vec::new(), CorrectionError::Empty)]
    #[case(vec![set(" ", "a", "1")], CorrectionError::EmptyPattern)]
    #[case(
        vec![set("item", "a'b", "1")],
        CorrectionError::InvalidName { name: "a'b".to_owned() }
    )]
    fn rejects_unusable_corrections(
        #[case] corrections: Vec<Correction>,
        #[case] expected: CorrectionError,
    ) {
        assert_eq!(corrections_stylesheet(&corrections), Err(expected));
    }

    #[test]
    fn deserialises_match_field() {
        let correction: Correction = serde_json::from_str(
            r#"{"action":"set_attribute","match":"item","name":"unit","value":"g"}"#,
        )
        .expect("parse correction");
        assert_eq!(correction, set("item", "unit", "g"));
    }
}
