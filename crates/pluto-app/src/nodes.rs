// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::Node;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRow {
    pub primary: String,
    pub props: String,
    pub tags: String,
}

impl NodeRow {
    fn from_node(node: &Node) -> Self {
        let props = node
            .props
            .keys()
            .filter_map(|name| node.prop_repr(name).map(|repr| format!("{name}={repr}")))
            .collect::<Vec<_>>()
            .join("  ");
        let tags = node
            .tags
            .iter()
            .map(|tag| format!("#{tag}"))
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            primary: node.primary_repr(),
            props,
            tags,
        }
    }
}

/// Append-only rows for a single form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTable {
    id: u64,
    form: String,
    rows: Vec<NodeRow>,
}

impl NodeTable {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn form(&self) -> &str {
        &self.form
    }

    pub fn rows(&self) -> &[NodeRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One table per form, in the order forms were first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeTables {
    tables: Vec<NodeTable>,
    by_form: HashMap<String, usize>,
    next_id: u64,
}

impl NodeTables {
    pub fn tables(&self) -> &[NodeTable] {
        &self.tables
    }

    pub fn get(&self, form: &str) -> Option<&NodeTable> {
        self.by_form.get(form).map(|index| &self.tables[*index])
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.tables.iter().map(NodeTable::len).sum()
    }

    /// Returns the number of rows appended.
    pub fn add<I>(&mut self, nodes: I) -> usize
    where
        I: IntoIterator<Item = Node>,
    {
        let mut added = 0;
        for node in nodes {
            let index = self.table_index(&node.form);
            self.tables[index].rows.push(NodeRow::from_node(&node));
            added += 1;
        }
        added
    }

    pub fn clear(&mut self) {
        self.tables.clear();
        self.by_form.clear();
    }

    fn table_index(&mut self, form: &str) -> usize {
        if let Some(index) = self.by_form.get(form) {
            return *index;
        }

        let index = self.tables.len();
        self.tables.push(NodeTable {
            id: self.next_id,
            form: form.to_owned(),
            rows: Vec::new(),
        });
        self.next_id += 1;
        self.by_form.insert(form.to_owned(), index);
        index
    }
}
