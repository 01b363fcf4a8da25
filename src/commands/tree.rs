//! # Tree Command Implementation
//!
//! This module implements the `tree` subcommand, which displays architectures
//! as management group trees.
//!
//! ## Functionality
//!
//! - **Architecture Visualization**: one tree per root management group,
//!   each node labelled with its id, its archetypes and an `(exists)` marker
//!   for groups that are not created
//! - **Depth Control**: `--depth` limits how many levels are shown
//!
//! This command is a safe, read-only operation that does not modify any files.

use anyhow::Result;
use clap::Args;
use ptree::{print_tree, TreeItem};
use std::path::PathBuf;

use alzlib::architecture::{Architecture, ManagementGroup};
use alzlib::config::CONFIG_FILE_NAME;

/// Display architectures as management group trees
#[derive(Args, Debug)]
pub struct TreeArgs {
    /// The architecture to display. All architectures when omitted.
    pub architecture: Option<String>,

    /// Path to the workspace configuration file.
    #[arg(short, long, value_name = "FILE", default_value = CONFIG_FILE_NAME)]
    pub config: PathBuf,

    /// Maximum depth to display in the tree.
    ///
    /// Use 0 to show only the root management groups.
    #[arg(long, value_name = "NUM")]
    pub depth: Option<usize>,
}

/// Execute the `tree` command.
pub fn execute(args: TreeArgs) -> Result<()> {
    let alz = super::load(&args.config)?;
    let names = match &args.architecture {
        Some(name) => vec![name.clone()],
        None => alz.architectures()?,
    };
    if names.is_empty() {
        println!("No architectures defined");
        return Ok(());
    }

    let max_depth = args.depth.unwrap_or(usize::MAX);
    for name in names {
        let architecture = alz.architecture(&name)?;
        println!("🌳 {}", architecture.name());
        for root in architecture.roots() {
            let tree_root = build_tree_node(&architecture, root, max_depth, 0);
            print_tree(&tree_root).map_err(|e| anyhow::anyhow!("Failed to display tree: {}", e))?;
        }
    }
    Ok(())
}

fn label(group: &ManagementGroup) -> String {
    let mut label = group.id().to_string();
    if !group.archetypes().is_empty() {
        label.push_str(&format!(" [{}]", group.archetypes().join(", ")));
    }
    if group.exists() {
        label.push_str(" (exists)");
    }
    label
}

/// Build a tree node from a management group
fn build_tree_node(
    architecture: &Architecture,
    group: &ManagementGroup,
    max_depth: usize,
    current_depth: usize,
) -> TreeNode {
    let children = if current_depth >= max_depth {
        vec![]
    } else {
        architecture
            .children(group.id())
            .into_iter()
            .map(|child| build_tree_node(architecture, child, max_depth, current_depth + 1))
            .collect()
    };
    TreeNode {
        label: label(group),
        children,
    }
}

/// Tree node structure for ptree visualization
#[derive(Clone)]
struct TreeNode {
    label: String,
    children: Vec<TreeNode>,
}

impl TreeItem for TreeNode {
    type Child = TreeNode;

    fn write_self<W: std::io::Write>(
        &self,
        f: &mut W,
        _style: &ptree::Style,
    ) -> std::io::Result<()> {
        write!(f, "{}", self.label)
    }

    fn children(&self) -> std::borrow::Cow<'_, [Self::Child]> {
        std::borrow::Cow::Borrowed(&self.children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alzlib::filesystem::LibraryFs;
    use alzlib::{AlzLib, AlzLibOptions};

    fn architecture() -> Architecture {
        let alz = AlzLib::new(AlzLibOptions::default()).unwrap();
        alz.init(&[LibraryFs::new("lib").with_file(
            "alz.alz_architecture_definition.json",
            r#"{"name": "alz", "management_groups": [
                {"id": "tenant", "archetypes": [], "exists": true},
                {"id": "alz", "archetypes": ["empty"], "parent_id": "tenant"},
                {"id": "platform", "archetypes": ["empty"], "parent_id": "alz"}
            ]}"#,
        )])
        .unwrap();
        alz.architecture("alz").unwrap()
    }

    #[test]
    fn test_build_tree_node_labels_and_depth() {
        let arch = architecture();
        let root = arch.management_group("tenant").unwrap();

        let full = build_tree_node(&arch, root, usize::MAX, 0);
        assert_eq!(full.label, "tenant (exists)");
        assert_eq!(full.children[0].label, "alz [empty]");
        assert_eq!(full.children[0].children[0].label, "platform [empty]");

        let shallow = build_tree_node(&arch, root, 1, 0);
        assert_eq!(shallow.children.len(), 1);
        assert!(shallow.children[0].children.is_empty());
    }

    #[test]
    fn test_execute_missing_config() {
        let args = TreeArgs {
            architecture: None,
            config: PathBuf::from("/nonexistent/.alzlib.yaml"),
            depth: None,
        };
        let result = execute(args);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to load config"));
    }
}
