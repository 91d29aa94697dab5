//! Parser for the deb822 stanza format used by `Packages` and `Sources` indexes.

use indexmap::IndexMap;

use crate::error::{RegistryError, Result};

/// One paragraph of an index: field name to value, in document order.
///
/// Multi-line values keep their continuation lines joined with `\n`, with the
/// leading whitespace of each continuation line removed.
pub type Stanza = IndexMap<String, String>;

/// Splits an index document into stanzas.
///
/// Blank lines separate stanzas; runs of blank lines are allowed. `resource`
/// is only used to label errors.
///
/// # Errors
///
/// * [`RegistryError::Syntax`] for a continuation line with no field before it,
///   a line without a `:` separator, an empty field name, or a field repeated
///   within one stanza.
pub fn parse_stanzas(text: &str, resource: &str) -> Result<Vec<Stanza>> {
    let mut stanzas = Vec::new();
    let mut current = Stanza::new();
    let mut last_field: Option<String> = None;

    let syntax = |line: usize, reason: &str| {
        RegistryError::Syntax {
            resource: resource.to_string(),
            line,
            reason: reason.to_string(),
        }
    };

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim_end_matches('\r');

        if line.trim().is_empty() {
            if !current.is_empty() {
                stanzas.push(std::mem::take(&mut current));
            }
            last_field = None;
            continue;
        }

        if line.starts_with('#') && current.is_empty() {
            continue;
        }

        if line.starts_with(' ') || line.starts_with('\t') {
            let field = last_field
                .as_ref()
                .ok_or_else(|| syntax(line_no, "continuation line without a field"))?;
            if let Some(value) = current.get_mut(field) {
                let continuation = line.trim_start();
                // A lone "." stands for an empty line inside a description.
                let continuation = if continuation == "." { "" } else { continuation };
                value.push('\n');
                value.push_str(continuation);
            }
            continue;
        }

        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| syntax(line_no, "expected `Field: value`"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(syntax(line_no, "empty field name"));
        }
        if current.contains_key(name) {
            return Err(syntax(line_no, &format!("field `{name}` repeated")));
        }

        current.insert(name.to_string(), value.trim().to_string());
        last_field = Some(name.to_string());
    }

    if !current.is_empty() {
        stanzas.push(current);
    }

    Ok(stanzas)
}
