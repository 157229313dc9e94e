//! Category tree
//!
//! Categories reference their parent by id. [`CategoryTree`] loads a flat
//! list into an arena where parent and children are indices into `nodes`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use crate::domain::value_objects::Slug;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: Slug,
    pub parent_id: Option<Uuid>,
    pub is_active: bool,
}

#[derive(Clone, Debug)]
pub struct CategoryNode {
    pub category: Category,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct CategoryTree {
    nodes: Vec<CategoryNode>,
    by_id: HashMap<Uuid, usize>,
}

/// Nested rendering of the tree for API responses.
#[derive(Clone, Debug, Serialize)]
pub struct CategoryBranch {
    #[serde(flatten)]
    pub category: Category,
    pub children: Vec<CategoryBranch>,
}

impl CategoryTree {
    /// Categories whose parent is missing from `categories` become roots.
    pub fn build(mut categories: Vec<Category>) -> Self {
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        let by_id: HashMap<Uuid, usize> = categories.iter().enumerate().map(|(i, c)| (c.id, i)).collect();
        let mut nodes: Vec<CategoryNode> = categories.into_iter()
            .map(|category| CategoryNode { category, parent: None, children: vec![] })
            .collect();
        for i in 0..nodes.len() {
            let parent = nodes[i].category.parent_id.and_then(|pid| by_id.get(&pid).copied()).filter(|&p| p != i);
            nodes[i].parent = parent;
            if let Some(p) = parent { nodes[p].children.push(i); }
        }
        let mut tree = Self { nodes, by_id };
        tree.break_cycles();
        tree
    }

    // A parent chain that loops back on itself is cut at the node that closes it.
    fn break_cycles(&mut self) {
        for start in 0..self.nodes.len() {
            let mut seen = vec![start];
            let mut cur = self.nodes[start].parent;
            while let Some(p) = cur {
                if seen.contains(&p) {
                    let child = *seen.last().unwrap_or(&start);
                    self.nodes[child].parent = None;
                    self.nodes[p].children.retain(|&c| c != child);
                    break;
                }
                seen.push(p);
                cur = self.nodes[p].parent;
            }
        }
    }

    pub fn len(&self) -> usize { self.nodes.len() }
    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }
    pub fn get(&self, id: Uuid) -> Option<&Category> { self.by_id.get(&id).map(|&i| &self.nodes[i].category) }
    pub fn iter(&self) -> impl Iterator<Item = &Category> { self.nodes.iter().map(|n| &n.category) }

    pub fn roots(&self) -> impl Iterator<Item = &Category> {
        self.nodes.iter().filter(|n| n.parent.is_none()).map(|n| &n.category)
    }

    pub fn children(&self, id: Uuid) -> Vec<&Category> {
        self.by_id.get(&id).map(|&i| self.nodes[i].children.iter().map(|&c| &self.nodes[c].category).collect()).unwrap_or_default()
    }

    /// Root first, ending with the category itself.
    pub fn path(&self, id: Uuid) -> Vec<&Category> {
        let mut path = vec![];
        let mut cur = self.by_id.get(&id).copied();
        while let Some(i) = cur {
            path.push(&self.nodes[i].category);
            cur = self.nodes[i].parent;
        }
        path.reverse();
        path
    }

    /// The category and all of its descendants.
    pub fn subtree_ids(&self, id: Uuid) -> Vec<Uuid> {
        let Some(&start) = self.by_id.get(&id) else { return vec![] };
        let mut out = vec![];
        let mut stack = vec![start];
        while let Some(i) = stack.pop() {
            out.push(self.nodes[i].category.id);
            stack.extend(self.nodes[i].children.iter().rev());
        }
        out
    }

    pub fn branches(&self) -> Vec<CategoryBranch> {
        self.nodes.iter().enumerate().filter(|(_, n)| n.parent.is_none()).map(|(i, _)| self.branch(i)).collect()
    }

    fn branch(&self, i: usize) -> CategoryBranch {
        CategoryBranch {
            category: self.nodes[i].category.clone(),
            children: self.nodes[i].children.iter().map(|&c| self.branch(c)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat(name: &str, parent: Option<Uuid>) -> Category {
        Category { id: Uuid::now_v7(), name: name.into(), slug: Slug::from_name(name).unwrap(), parent_id: parent, is_active: true }
    }

    #[test]
    fn test_tree_navigation() {
        let men = cat("Men", None);
        let shoes = cat("Shoes", Some(men.id));
        let boots = cat("Boots", Some(shoes.id));
        let women = cat("Women", None);
        let tree = CategoryTree::build(vec![boots.clone(), women.clone(), men.clone(), shoes.clone()]);

        let roots: Vec<&str> = tree.roots().map(|c| c.name.as_str()).collect();
        assert_eq!(roots, vec!["Men", "Women"]);
        assert_eq!(tree.children(men.id)[0].id, shoes.id);
        let path: Vec<&str> = tree.path(boots.id).iter().map(|c| c.name.as_str()).collect();
        assert_eq!(path, vec!["Men", "Shoes", "Boots"]);
        assert_eq!(tree.subtree_ids(men.id), vec![men.id, shoes.id, boots.id]);
        assert_eq!(tree.branches()[0].children[0].children[0].category.id, boots.id);
    }

    #[test]
    fn test_cycle_is_cut() {
        let mut a = cat("A", None);
        let b = cat("B", Some(a.id));
        a.parent_id = Some(b.id);
        let tree = CategoryTree::build(vec![a.clone(), b.clone()]);
        assert_eq!(tree.roots().count(), 1);
        assert_eq!(tree.subtree_ids(tree.roots().next().unwrap().id).len(), 2);
    }
}
