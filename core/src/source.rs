//! Inner-class classification and the per-file source tree.
//!
//! Inner and anonymous classes are not scheduled as their own tasks in
//! decompile mode; they render inside their declaring class's file. The
//! tree keeps children as index lists and the parent as a back index, so
//! ownership stays acyclic.

use ahash::AHashMap;
use declass_dex::Dex;

/// Simple name of a type descriptor: `Lcom/a/B$C;` → `B$C`, last segment
/// without the package.
pub fn simple_name(descriptor: &str) -> &str {
    let trimmed = descriptor
        .strip_prefix('L')
        .and_then(|d| d.strip_suffix(';'))
        .unwrap_or(descriptor);
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Package path of a descriptor (`com/a`), empty for the default package.
pub fn package_path(descriptor: &str) -> &str {
    let trimmed = descriptor
        .strip_prefix('L')
        .and_then(|d| d.strip_suffix(';'))
        .unwrap_or(descriptor);
    match trimmed.rfind('/') {
        Some(pos) => &trimmed[..pos],
        None => "",
    }
}

/// A class is inner when its simple name carries a `$`, or when the
/// source-file attribute disagrees with the simple name.
pub fn is_inner(dex: &Dex, class_index: usize) -> bool {
    let class = &dex.class_defs[class_index];
    let Ok(descriptor) = class.descriptor(dex) else {
        return false;
    };
    let simple = simple_name(&descriptor);
    if simple.contains('$') {
        return true;
    }
    if let Ok(Some(source)) = class.source_file(dex) {
        let stem = source.strip_suffix(".java").unwrap_or(&source);
        if !stem.is_empty() && stem != simple {
            return true;
        }
    }
    false
}

/// Anonymous: the tail after the last `$` is purely numeric.
pub fn is_anonymous(descriptor: &str) -> bool {
    let trimmed = descriptor.strip_suffix(';').unwrap_or(descriptor);
    match trimmed.rsplit('$').next() {
        Some(tail) if !tail.is_empty() => tail.bytes().all(|b| b.is_ascii_digit()),
        _ => false,
    }
}

/// One logical output file (or a nested class inside one).
#[derive(Debug)]
pub struct SourceNode {
    /// Index into `dex.class_defs`.
    pub class_index: usize,
    /// Children, as indices into the tree's node list.
    pub children: Vec<usize>,
    /// Back reference into the node list; `None` for top-level files.
    pub parent: Option<usize>,
}

/// The forest of source files of one image.
#[derive(Debug, Default)]
pub struct SourceTree {
    pub nodes: Vec<SourceNode>,
    /// Node ids of top-level (file-producing) classes.
    pub roots: Vec<usize>,
}

impl SourceTree {
    /// Group the image's class definitions into files: every non-inner
    /// class makes a root, inner classes attach to the deepest enclosing
    /// class present in the image, falling back to a root of their own
    /// when the enclosing class is missing.
    pub fn build(dex: &Dex) -> SourceTree {
        let mut tree = SourceTree::default();
        let mut node_by_descriptor: AHashMap<String, usize> = AHashMap::new();

        // roots first so parents exist before their children
        let mut indices: Vec<usize> = (0..dex.class_defs.len()).collect();
        indices.sort_by_key(|&i| {
            dex.class_defs[i]
                .descriptor(dex)
                .map(|d| d.matches('$').count())
                .unwrap_or(0)
        });

        for class_index in indices {
            let descriptor = match dex.class_defs[class_index].descriptor(dex) {
                Ok(d) => d.into_owned(),
                Err(_) => continue,
            };

            let node_id = tree.nodes.len();
            let parent = if is_inner(dex, class_index) {
                enclosing_descriptor(&descriptor)
                    .and_then(|enclosing| node_by_descriptor.get(&enclosing).copied())
            } else {
                None
            };

            tree.nodes.push(SourceNode {
                class_index,
                children: Vec::new(),
                parent,
            });
            match parent {
                Some(parent_id) => tree.nodes[parent_id].children.push(node_id),
                None => tree.roots.push(node_id),
            }
            node_by_descriptor.insert(descriptor, node_id);
        }

        tree
    }

    /// Class-def indices eligible for scheduling as top-level tasks.
    pub fn root_class_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.roots.iter().map(|&id| self.nodes[id].class_index)
    }
}

/// `La/B$C$D;` → `La/B$C;`
fn enclosing_descriptor(descriptor: &str) -> Option<String> {
    let trimmed = descriptor.strip_suffix(';')?;
    let pos = trimmed.rfind('$')?;
    Some(format!("{};", &trimmed[..pos]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_names() {
        assert_eq!(simple_name("La/b/C;"), "C");
        assert_eq!(simple_name("LC;"), "C");
        assert_eq!(simple_name("La/b/C$D;"), "C$D");
    }

    #[test]
    fn packages() {
        assert_eq!(package_path("La/b/C;"), "a/b");
        assert_eq!(package_path("LC;"), "");
    }

    #[test]
    fn anonymous_tails() {
        assert!(is_anonymous("La/B$1;"));
        assert!(is_anonymous("La/B$C$12;"));
        assert!(!is_anonymous("La/B$Inner;"));
        assert!(!is_anonymous("La/B;"));
    }

    #[test]
    fn enclosing_chain() {
        assert_eq!(enclosing_descriptor("La/B$C$D;"), Some("La/B$C;".to_owned()));
        assert_eq!(enclosing_descriptor("La/B;"), None);
    }
}
