//! Mermaid flowchart rendering of a bucket's tree.

use std::fmt::Write;

use crate::btree::tree::Tree;
use crate::common::{PageId, Result};

impl Tree {
    /// Render the tree as a Mermaid `graph TD` with one box per page and an
    /// edge from every internal node to each of its children.
    pub fn to_mermaid(&self) -> Result<String> {
        let mut out = String::from("graph TD;\n");
        self.render(self.root(), &mut out)?;
        Ok(out)
    }

    fn render(&self, pgid: PageId, out: &mut String) -> Result<()> {
        let node = self.load(pgid)?;
        let keys = node
            .keys()
            .iter()
            .map(|k| escape(&String::from_utf8_lossy(k)))
            .collect::<Vec<_>>()
            .join(" | ");
        let kind = if node.is_leaf() { "leaf" } else { "internal" };

        // Writing into a String cannot fail.
        let _ = writeln!(out, "    P{}[\"{} {}: {}\"]", pgid.0, pgid, kind, keys);
        for &child in node.children() {
            let _ = writeln!(out, "    P{} --> P{}", pgid.0, child.0);
        }
        for &child in node.children() {
            self.render(child, out)?;
        }
        Ok(())
    }
}

fn escape(label: &str) -> String {
    label.replace('"', "#quot;")
}
