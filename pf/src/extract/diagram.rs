use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

static MERMAID_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```mermaid\s*([\s\S]*?)```").expect("valid mermaid regex"));

/// A diagram pulled out of markdown, and what was left around it
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiagramSplit {
    pub diagram: Option<String>,
    pub rest: String,
}

/// Split the first mermaid block out of `raw`
///
/// Every complete mermaid block is removed from `rest`, so running this again
/// on `rest` never finds another diagram. An unclosed fence is left alone.
pub fn extract_diagram(raw: &str) -> DiagramSplit {
    debug!(raw_len = raw.len(), "extract_diagram: called");

    let Some(caps) = MERMAID_BLOCK.captures(raw) else {
        return DiagramSplit {
            diagram: None,
            rest: raw.to_string(),
        };
    };
    let diagram = caps.get(1).map(|m| m.as_str().trim().to_string());

    // Removing one block can splice two fragments into a new one
    let mut rest = raw.to_string();
    while MERMAID_BLOCK.is_match(&rest) {
        rest = MERMAID_BLOCK.replace_all(&rest, "").into_owned();
    }

    DiagramSplit { diagram, rest }
}

/// Turn literal `\n` and `\t` escapes into real whitespace
///
/// Models sometimes double-escape diagram source. Only used on diagrams,
/// never on text headed for a JSON parser.
pub fn unescape_diagram(text: &str) -> String {
    text.replace("\\n", "\n").replace("\\t", "\t")
}
