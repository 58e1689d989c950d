use std::collections::{BTreeMap, BTreeSet};

use cellvault_core::{CellPayload, QualifiedAddress};

use crate::references::extract_all_cell_references;

/// Adjacency map from a cell to a set of cells
pub type AdjacencyMap = BTreeMap<QualifiedAddress, BTreeSet<QualifiedAddress>>;

/// Bidirectional precedent/dependent graph between cells
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DependencyGraph {
    /// Maps a cell to the cells its formula reads
    /// e.g., if A1 = B1 + C1, then precedents[A1] = {B1, C1}
    precedents: AdjacencyMap,

    /// Maps a cell to the cells whose formulas read it (reverse lookup)
    /// e.g., if A1 = B1 + C1, then dependents[B1] contains A1
    dependents: AdjacencyMap,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `cell` reads `precedent`
    pub fn add_edge(&mut self, cell: QualifiedAddress, precedent: QualifiedAddress) {
        self.dependents
            .entry(precedent.clone())
            .or_default()
            .insert(cell.clone());
        self.precedents.entry(cell).or_default().insert(precedent);
    }

    /// Cells the given cell's formula reads
    pub fn precedents(&self, cell: &QualifiedAddress) -> Option<&BTreeSet<QualifiedAddress>> {
        self.precedents.get(cell)
    }

    /// Cells whose formulas read the given cell
    pub fn dependents(&self, cell: &QualifiedAddress) -> Option<&BTreeSet<QualifiedAddress>> {
        self.dependents.get(cell)
    }

    pub fn edge_count(&self) -> usize {
        self.precedents.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.precedents.is_empty()
    }

    /// `A ∈ precedents(B)` exactly when `B ∈ dependents(A)`
    pub fn is_symmetric(&self) -> bool {
        let forward = self.precedents.iter().all(|(cell, precedents)| {
            precedents
                .iter()
                .all(|p| self.dependents.get(p).is_some_and(|d| d.contains(cell)))
        });
        let backward = self.dependents.iter().all(|(cell, dependents)| {
            dependents
                .iter()
                .all(|d| self.precedents.get(d).is_some_and(|p| p.contains(cell)))
        });
        forward && backward
    }
}

/// Build the precedent/dependent graph for a full set of cells.
///
/// Cells without a formula contribute no edges. A formula that yields no
/// references (or only malformed ones) is skipped and the pass carries on.
pub fn build_dependency_maps(cells: &BTreeMap<QualifiedAddress, CellPayload>) -> DependencyGraph {
    let mut graph = DependencyGraph::new();

    for (cell, payload) in cells {
        let Some(formula) = payload.formula_text() else {
            continue;
        };

        let precedents = extract_all_cell_references(Some(formula), &cell.sheet);
        if precedents.is_empty() {
            tracing::debug!("No references found in formula of {}: {}", cell, formula);
            continue;
        }

        for precedent in precedents {
            graph.add_edge(cell.clone(), precedent);
        }
    }

    tracing::debug!(
        "Built dependency graph: {} cells, {} edges",
        cells.len(),
        graph.edge_count()
    );
    graph
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(text: &str) -> QualifiedAddress {
        QualifiedAddress::parse(text).unwrap()
    }

    fn cells(entries: &[(&str, CellPayload)]) -> BTreeMap<QualifiedAddress, CellPayload> {
        entries
            .iter()
            .map(|(a, payload)| (addr(a), payload.clone()))
            .collect()
    }

    #[test]
    fn test_build_links_both_directions() {
        let graph = build_dependency_maps(&cells(&[
            ("Sheet1!A1", CellPayload::value(10.0)),
            ("Sheet1!B1", CellPayload::formula("=A1*2")),
            ("Sheet1!C1", CellPayload::formula("=SUM(A1:B1)")),
            ("Sheet2!A1", CellPayload::formula("=Sheet1!C1")),
        ]));

        let c1 = graph.precedents(&addr("Sheet1!C1")).unwrap();
        assert!(c1.contains(&addr("Sheet1!A1")) && c1.contains(&addr("Sheet1!B1")));

        let a1 = graph.dependents(&addr("Sheet1!A1")).unwrap();
        assert_eq!(a1.len(), 2);
        assert!(graph.dependents(&addr("Sheet1!C1")).unwrap().contains(&addr("Sheet2!A1")));
        assert!(graph.precedents(&addr("Sheet1!A1")).is_none());
        assert_eq!(graph.edge_count(), 4);
    }

    #[test]
    fn test_graph_is_symmetric() {
        let graph = build_dependency_maps(&cells(&[
            ("Sheet1!A1", CellPayload::formula("=B1+B2")),
            ("Sheet1!B1", CellPayload::formula("=B2")),
            ("Sheet1!B2", CellPayload::formula("=Other!A1:A3")),
            ("Sheet1!D4", CellPayload::formula("not a formula")),
            ("Sheet1!D5", CellPayload::formula("=SUM(A1:Z1000)")),
        ]));
        assert!(graph.is_symmetric());

        for (cell, reads) in &graph.precedents {
            for p in reads {
                assert!(graph.dependents[p].contains(cell));
            }
        }
        for (cell, readers) in &graph.dependents {
            for d in readers {
                assert!(graph.precedents[d].contains(cell));
            }
        }
    }

    #[test]
    fn test_cells_without_formulas_add_no_edges() {
        let graph = build_dependency_maps(&cells(&[
            ("Sheet1!A1", CellPayload::value(1.0)),
            ("Sheet1!A2", CellPayload::formula("")),
        ]));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_add_edge_is_idempotent() {
        let mut graph = DependencyGraph::new();
        graph.add_edge(addr("S!A1"), addr("S!B1"));
        graph.add_edge(addr("S!A1"), addr("S!B1"));

        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.dependents(&addr("S!B1")).unwrap().len(), 1);
        assert!(graph.is_symmetric());
    }
}
