// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-memory reference graph
//!
//! Adjacency-list storage behind a `parking_lot::RwLock`. This is ordinary
//! CRUD code by design; the interesting machinery lives in the step
//! pipeline, which only ever sees the [`Graph`] trait.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::structure::element::{Cardinality, Direction, Edge, Vertex};
use crate::structure::graph::{Graph, StructureError};
use crate::structure::value::Value;

#[derive(Debug, Default)]
struct VertexRecord {
    label: String,
    properties: BTreeMap<String, Vec<Value>>,
    out_edges: Vec<i64>,
    in_edges: Vec<i64>,
}

#[derive(Debug)]
struct EdgeRecord {
    label: String,
    out_v: i64,
    in_v: i64,
    properties: BTreeMap<String, Value>,
}

#[derive(Debug, Default)]
struct GraphData {
    vertices: BTreeMap<i64, VertexRecord>,
    edges: BTreeMap<i64, EdgeRecord>,
    next_id: i64,
}

impl GraphData {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// The in-memory reference implementation of [`Graph`].
#[derive(Debug, Default)]
pub struct MemoryGraph {
    data: RwLock<GraphData>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a vertex with a caller-chosen id, for fixture building.
    /// Returns an error if the id is already taken.
    pub fn add_vertex_with_id(&self, id: i64, label: &str) -> Result<Vertex, StructureError> {
        let mut data = self.data.write();
        if data.vertices.contains_key(&id) {
            return Err(StructureError::VertexAlreadyExists(id));
        }
        data.next_id = data.next_id.max(id);
        data.vertices.insert(id, VertexRecord { label: label.to_string(), ..Default::default() });
        Ok(Vertex::new(id, label))
    }
}

impl Graph for MemoryGraph {
    fn vertices(&self, ids: &[i64]) -> Vec<Vertex> {
        let data = self.data.read();
        if ids.is_empty() {
            data.vertices
                .iter()
                .map(|(id, rec)| Vertex::new(*id, rec.label.clone()))
                .collect()
        } else {
            ids.iter()
                .filter_map(|id| data.vertices.get(id).map(|rec| Vertex::new(*id, rec.label.clone())))
                .collect()
        }
    }

    fn edges(&self, ids: &[i64]) -> Vec<Edge> {
        let data = self.data.read();
        let to_edge = |id: &i64, rec: &EdgeRecord| Edge::new(*id, rec.label.clone(), rec.out_v, rec.in_v);
        if ids.is_empty() {
            data.edges.iter().map(|(id, rec)| to_edge(id, rec)).collect()
        } else {
            ids.iter()
                .filter_map(|id| data.edges.get(id).map(|rec| to_edge(id, rec)))
                .collect()
        }
    }

    fn vertex(&self, id: i64) -> Result<Vertex, StructureError> {
        let data = self.data.read();
        data.vertices
            .get(&id)
            .map(|rec| Vertex::new(id, rec.label.clone()))
            .ok_or(StructureError::VertexNotFound(id))
    }

    fn edge(&self, id: i64) -> Result<Edge, StructureError> {
        let data = self.data.read();
        data.edges
            .get(&id)
            .map(|rec| Edge::new(id, rec.label.clone(), rec.out_v, rec.in_v))
            .ok_or(StructureError::EdgeNotFound(id))
    }

    fn add_vertex(&self, label: &str) -> Result<Vertex, StructureError> {
        let mut data = self.data.write();
        let id = data.allocate_id();
        data.vertices.insert(id, VertexRecord { label: label.to_string(), ..Default::default() });
        Ok(Vertex::new(id, label))
    }

    fn add_edge(&self, label: &str, out_v: i64, in_v: i64) -> Result<Edge, StructureError> {
        let mut data = self.data.write();
        if !data.vertices.contains_key(&out_v) {
            return Err(StructureError::VertexNotFound(out_v));
        }
        if !data.vertices.contains_key(&in_v) {
            return Err(StructureError::VertexNotFound(in_v));
        }
        let id = data.allocate_id();
        data.edges.insert(
            id,
            EdgeRecord {
                label: label.to_string(),
                out_v,
                in_v,
                properties: BTreeMap::new(),
            },
        );
        if let Some(rec) = data.vertices.get_mut(&out_v) {
            rec.out_edges.push(id);
        }
        if let Some(rec) = data.vertices.get_mut(&in_v) {
            rec.in_edges.push(id);
        }
        Ok(Edge::new(id, label, out_v, in_v))
    }

    fn remove_vertex(&self, id: i64) -> Result<(), StructureError> {
        let mut data = self.data.write();
        let rec = data.vertices.remove(&id).ok_or(StructureError::VertexNotFound(id))?;
        let incident: Vec<i64> = rec.out_edges.iter().chain(rec.in_edges.iter()).copied().collect();
        for edge_id in incident {
            if let Some(edge) = data.edges.remove(&edge_id) {
                if let Some(other) = data.vertices.get_mut(&edge.out_v) {
                    other.out_edges.retain(|e| *e != edge_id);
                }
                if let Some(other) = data.vertices.get_mut(&edge.in_v) {
                    other.in_edges.retain(|e| *e != edge_id);
                }
            }
        }
        Ok(())
    }

    fn remove_edge(&self, id: i64) -> Result<(), StructureError> {
        let mut data = self.data.write();
        let rec = data.edges.remove(&id).ok_or(StructureError::EdgeNotFound(id))?;
        if let Some(v) = data.vertices.get_mut(&rec.out_v) {
            v.out_edges.retain(|e| *e != id);
        }
        if let Some(v) = data.vertices.get_mut(&rec.in_v) {
            v.in_edges.retain(|e| *e != id);
        }
        Ok(())
    }

    fn set_vertex_property(
        &self,
        id: i64,
        key: &str,
        value: Value,
        cardinality: Cardinality,
    ) -> Result<(), StructureError> {
        if key.is_empty() {
            return Err(StructureError::EmptyPropertyKey);
        }
        let mut data = self.data.write();
        let rec = data.vertices.get_mut(&id).ok_or(StructureError::VertexNotFound(id))?;
        let slot = rec.properties.entry(key.to_string()).or_default();
        match cardinality {
            Cardinality::Single => {
                slot.clear();
                slot.push(value);
            }
            Cardinality::List => slot.push(value),
            Cardinality::Set => {
                if !slot.contains(&value) {
                    slot.push(value);
                }
            }
        }
        Ok(())
    }

    fn set_edge_property(&self, id: i64, key: &str, value: Value) -> Result<(), StructureError> {
        if key.is_empty() {
            return Err(StructureError::EmptyPropertyKey);
        }
        let mut data = self.data.write();
        let rec = data.edges.get_mut(&id).ok_or(StructureError::EdgeNotFound(id))?;
        rec.properties.insert(key.to_string(), value);
        Ok(())
    }

    fn remove_vertex_property(&self, id: i64, key: &str) -> Result<(), StructureError> {
        let mut data = self.data.write();
        let rec = data.vertices.get_mut(&id).ok_or(StructureError::VertexNotFound(id))?;
        rec.properties.remove(key);
        Ok(())
    }

    fn remove_edge_property(&self, id: i64, key: &str) -> Result<(), StructureError> {
        let mut data = self.data.write();
        let rec = data.edges.get_mut(&id).ok_or(StructureError::EdgeNotFound(id))?;
        rec.properties.remove(key);
        Ok(())
    }

    fn vertex_properties(&self, id: i64, keys: &[String]) -> Vec<(String, Value)> {
        let data = self.data.read();
        let Some(rec) = data.vertices.get(&id) else {
            return Vec::new();
        };
        rec.properties
            .iter()
            .filter(|(k, _)| keys.is_empty() || keys.iter().any(|key| key == *k))
            .flat_map(|(k, values)| values.iter().map(move |v| (k.clone(), v.clone())))
            .collect()
    }

    fn edge_properties(&self, id: i64, keys: &[String]) -> Vec<(String, Value)> {
        let data = self.data.read();
        let Some(rec) = data.edges.get(&id) else {
            return Vec::new();
        };
        rec.properties
            .iter()
            .filter(|(k, _)| keys.is_empty() || keys.iter().any(|key| key == *k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn adjacent_vertices(&self, id: i64, direction: Direction, labels: &[String]) -> Vec<Vertex> {
        let data = self.data.read();
        let Some(rec) = data.vertices.get(&id) else {
            return Vec::new();
        };
        let mut result = Vec::new();
        let mut collect = |edge_ids: &[i64], other_end: fn(&EdgeRecord) -> i64| {
            for edge_id in edge_ids {
                if let Some(edge) = data.edges.get(edge_id) {
                    if labels.is_empty() || labels.iter().any(|l| *l == edge.label) {
                        let other = other_end(edge);
                        if let Some(other_rec) = data.vertices.get(&other) {
                            result.push(Vertex::new(other, other_rec.label.clone()));
                        }
                    }
                }
            }
        };
        match direction {
            Direction::Out => collect(&rec.out_edges, |e| e.in_v),
            Direction::In => collect(&rec.in_edges, |e| e.out_v),
            Direction::Both => {
                collect(&rec.out_edges, |e| e.in_v);
                collect(&rec.in_edges, |e| e.out_v);
            }
        }
        result
    }

    fn incident_edges(&self, id: i64, direction: Direction, labels: &[String]) -> Vec<Edge> {
        let data = self.data.read();
        let Some(rec) = data.vertices.get(&id) else {
            return Vec::new();
        };
        let mut result = Vec::new();
        let mut collect = |edge_ids: &[i64]| {
            for edge_id in edge_ids {
                if let Some(edge) = data.edges.get(edge_id) {
                    if labels.is_empty() || labels.iter().any(|l| *l == edge.label) {
                        result.push(Edge::new(*edge_id, edge.label.clone(), edge.out_v, edge.in_v));
                    }
                }
            }
        };
        match direction {
            Direction::Out => collect(&rec.out_edges),
            Direction::In => collect(&rec.in_edges),
            Direction::Both => {
                collect(&rec.out_edges);
                collect(&rec.in_edges);
            }
        }
        result
    }

    fn vertex_count(&self) -> usize {
        self.data.read().vertices.len()
    }

    fn edge_count(&self) -> usize {
        self.data.read().edges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacency_respects_direction_and_label() {
        let g = MemoryGraph::new();
        let a = g.add_vertex("person").unwrap();
        let b = g.add_vertex("person").unwrap();
        let c = g.add_vertex("software").unwrap();
        g.add_edge("knows", a.id, b.id).unwrap();
        g.add_edge("created", a.id, c.id).unwrap();

        let knows: Vec<_> = g.adjacent_vertices(a.id, Direction::Out, &["knows".to_string()]);
        assert_eq!(knows.len(), 1);
        assert_eq!(knows[0].id, b.id);

        let all_out = g.adjacent_vertices(a.id, Direction::Out, &[]);
        assert_eq!(all_out.len(), 2);

        let into_b = g.adjacent_vertices(b.id, Direction::In, &[]);
        assert_eq!(into_b.len(), 1);
        assert_eq!(into_b[0].id, a.id);
    }

    #[test]
    fn vertex_removal_cascades_to_edges() {
        let g = MemoryGraph::new();
        let a = g.add_vertex("person").unwrap();
        let b = g.add_vertex("person").unwrap();
        g.add_edge("knows", a.id, b.id).unwrap();
        assert_eq!(g.edge_count(), 1);
        g.remove_vertex(a.id).unwrap();
        assert_eq!(g.edge_count(), 0);
        assert!(g.adjacent_vertices(b.id, Direction::In, &[]).is_empty());
    }

    #[test]
    fn duplicate_fixture_id_is_rejected() {
        let g = MemoryGraph::new();
        g.add_vertex_with_id(1, "person").unwrap();
        let err = g.add_vertex_with_id(1, "software").unwrap_err();
        assert!(matches!(err, StructureError::VertexAlreadyExists(1)));
    }

    #[test]
    fn property_cardinality_semantics() {
        let g = MemoryGraph::new();
        let v = g.add_vertex("person").unwrap();
        g.set_vertex_property(v.id, "name", Value::from("marko"), Cardinality::Single).unwrap();
        g.set_vertex_property(v.id, "name", Value::from("mark"), Cardinality::Single).unwrap();
        assert_eq!(g.vertex_properties(v.id, &["name".to_string()]).len(), 1);

        g.set_vertex_property(v.id, "skill", Value::Int(3), Cardinality::Set).unwrap();
        g.set_vertex_property(v.id, "skill", Value::Int(3), Cardinality::Set).unwrap();
        g.set_vertex_property(v.id, "skill", Value::Int(5), Cardinality::List).unwrap();
        assert_eq!(g.vertex_properties(v.id, &["skill".to_string()]).len(), 2);
    }
}
