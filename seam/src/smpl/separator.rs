use crate::smpl::DELETION_MARKER;
use crate::smpl::rewriter::{Marker, RewrittenSource};
use std::collections::BTreeSet;
use tracing::trace;

/// The two views of a rewritten patch. Both texts have identical line
/// counts, so a line number names the same patch location in either view;
/// `common` holds the context-line numbers present in both.
#[derive(Clone, Debug)]
pub struct Views {
    pub dels: String,
    pub adds: String,
    pub common: BTreeSet<usize>,
}

/// Split the rewritten source into the deletions view and the additions
/// view. Deleted lines stay in the deletions view (marker stripped) and
/// become either a deletion-anchor statement or a blank in the additions
/// view; added lines do the reverse.
pub fn separate(src: &RewrittenSource) -> Views {
    let mut dels = Vec::new();
    let mut adds = Vec::new();
    let mut common = BTreeSet::new();

    for (i, line) in src.text.lines().enumerate() {
        let n = i + 1;
        match src.markers.get(&n) {
            None => {
                dels.push(line.to_string());
                adds.push(line.to_string());
                common.insert(n);
            }
            Some(Marker::Deletion) => {
                dels.push(strip_marker(line));
                if src.blank_on_delete.contains(&n) {
                    adds.push(String::new());
                } else {
                    adds.push(format!("{DELETION_MARKER}();"));
                }
            }
            Some(Marker::Addition) => {
                dels.push(String::new());
                adds.push(strip_marker(line));
            }
        }
    }
    debug_assert_eq!(dels.len(), adds.len());
    trace!(lines = dels.len(), common = common.len(), "separated views");
    Views {
        dels: dels.join("\n") + "\n",
        adds: adds.join("\n") + "\n",
        common,
    }
}

/// Remove the leading marker character (and one following space) while
/// keeping the line's indentation
fn strip_marker(line: &str) -> String {
    let Some(idx) = line.find(|c: char| !c.is_whitespace()) else {
        return line.to_string();
    };
    let rest = &line[idx + 1..];
    format!("{}{}", &line[..idx], rest.strip_prefix(' ').unwrap_or(rest))
}
