// Praxis Engine — Graph Query
//
// Read-only subgraph and entity-detail views for callers (UI, RPC layer).
// Entities are global, but reads are account-scoped: the default subgraph
// is built from the account's own walks, and entity detail is only served
// when the account has touched the entity at least once.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::atoms::constants::{DEFAULT_GRAPH_DEPTH, ENTITY_RECENT_TRAJECTORIES};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{Edge, Entity, Trajectory};
use crate::engine::store::GraphStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center_id: Option<String>,
    pub depth: u32,
    pub min_weight: i64,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self { center_id: None, depth: DEFAULT_GRAPH_DEPTH, min_weight: 0 }
    }
}

/// A subgraph: nodes plus the edges among them that cleared the weight floor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphView {
    pub entities: Vec<Entity>,
    pub edges: Vec<Edge>,
}

/// One neighbor in the entity-detail view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborEntity {
    pub entity: Entity,
    pub weight: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDetail {
    pub entity: Entity,
    /// Connected entities, heaviest edge first.
    pub neighbors: Vec<NeighborEntity>,
    /// Up to five most recent walks that touched the entity.
    pub recent_trajectories: Vec<Trajectory>,
}

pub struct GraphQuery {
    store: Arc<GraphStore>,
}

impl GraphQuery {
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self { store }
    }

    /// Without a center: the subgraph the account's own walks have touched.
    /// With a center: BFS outward up to `depth` hops over edges clearing
    /// the weight floor, in either direction, without duplicates.
    pub fn get_graph(&self, account_id: &str, options: &GraphOptions) -> EngineResult<GraphView> {
        match &options.center_id {
            None => {
                let ids = self.store.entity_ids_for_account(account_id)?;
                let entities = self.store.entities_by_ids(&ids)?;
                let edges = self.store.edges_among(&ids, options.min_weight)?;
                Ok(GraphView { entities, edges })
            }
            Some(center_id) => {
                if self.store.find_entity_by_id(center_id)?.is_none() {
                    return Err(EngineError::not_found("Entity", center_id.clone()));
                }

                let mut visited: HashSet<String> = HashSet::new();
                let mut edge_ids: HashSet<String> = HashSet::new();
                let mut edges: Vec<Edge> = Vec::new();
                let mut frontier: Vec<String> = vec![center_id.clone()];
                visited.insert(center_id.clone());

                for _hop in 0..options.depth {
                    let mut next_frontier: Vec<String> = Vec::new();
                    for node in &frontier {
                        for edge in self.store.edges_touching(node, options.min_weight)? {
                            let other = if &edge.source_id == node {
                                edge.target_id.clone()
                            } else {
                                edge.source_id.clone()
                            };
                            if edge_ids.insert(edge.id.clone()) {
                                edges.push(edge);
                            }
                            if visited.insert(other.clone()) {
                                next_frontier.push(other);
                            }
                        }
                    }
                    if next_frontier.is_empty() {
                        break;
                    }
                    frontier = next_frontier;
                }

                let ids: Vec<String> = visited.into_iter().collect();
                let entities = self.store.entities_by_ids(&ids)?;
                Ok(GraphView { entities, edges })
            }
        }
    }

    /// Entity detail, gated on the per-account read view: an account that
    /// never touched the entity gets NotFound, not the global row.
    pub fn get_entity(&self, account_id: &str, entity_id: &str) -> EngineResult<EntityDetail> {
        if !self.store.account_touched_entity(account_id, entity_id)? {
            return Err(EngineError::not_found("Entity", entity_id));
        }

        let entity = self
            .store
            .find_entity_by_id(entity_id)?
            .ok_or_else(|| EngineError::not_found("Entity", entity_id))?;

        let mut edges = self.store.edges_touching(entity_id, 0)?;
        edges.sort_by(|a, b| b.weight.cmp(&a.weight));

        let mut neighbor_seen: HashSet<String> = HashSet::new();
        let mut neighbor_refs: Vec<(String, i64, Option<String>)> = Vec::new();
        for edge in &edges {
            let other = if edge.source_id == entity_id {
                edge.target_id.clone()
            } else {
                edge.source_id.clone()
            };
            if neighbor_seen.insert(other.clone()) {
                neighbor_refs.push((other, edge.weight, edge.relationship_type.clone()));
            }
        }

        let neighbor_ids: Vec<String> = neighbor_refs.iter().map(|(id, _, _)| id.clone()).collect();
        let neighbor_entities = self.store.entities_by_ids(&neighbor_ids)?;
        let neighbors = neighbor_refs
            .into_iter()
            .filter_map(|(id, weight, relationship_type)| {
                neighbor_entities
                    .iter()
                    .find(|e| e.id == id)
                    .cloned()
                    .map(|entity| NeighborEntity { entity, weight, relationship_type })
            })
            .collect();

        let recent_trajectories = self
            .store
            .recent_trajectories_touching(entity_id, ENTITY_RECENT_TRAJECTORIES as i64)?;

        Ok(EntityDetail { entity, neighbors, recent_trajectories })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::EventType;
    use crate::engine::tags::extract_tags;
    use crate::engine::trajectory::TrajectoryEngine;

    fn fixture() -> (Arc<GraphStore>, TrajectoryEngine, GraphQuery) {
        let store = Arc::new(GraphStore::open_in_memory().unwrap());
        let engine = TrajectoryEngine::new(store.clone());
        let query = GraphQuery::new(store.clone());
        (store, engine, query)
    }

    fn run_turn(engine: &TrajectoryEngine, account: &str, text: &str) {
        let tid = engine.start_trajectory(account, text, None).unwrap();
        for tag in extract_tags(text) {
            engine
                .touch_entity(
                    account,
                    &tid,
                    &tag.name,
                    Some(&tag.entity_type),
                    None,
                    EventType::Touch,
                    "user_message",
                    None,
                )
                .unwrap();
        }
        engine.complete_trajectory(&tid, account, None).unwrap();
    }

    #[test]
    fn test_account_subgraph_is_scoped() {
        let (_, engine, query) = fixture();
        run_turn(&engine, "alice", "[[topic:fractions]] [[strategy:games]]");
        run_turn(&engine, "bob", "[[topic:decimals]]");

        let alice = query.get_graph("alice", &GraphOptions::default()).unwrap();
        assert_eq!(alice.entities.len(), 2);
        assert_eq!(alice.edges.len(), 1);

        let bob = query.get_graph("bob", &GraphOptions::default()).unwrap();
        assert_eq!(bob.entities.len(), 1);
        assert!(bob.edges.is_empty());
    }

    #[test]
    fn test_centered_bfs_respects_depth() {
        let (store, engine, query) = fixture();
        // Chain: a → b → c → d.
        run_turn(&engine, "alice", "[[topic:a]] [[topic:b]] [[topic:c]] [[topic:d]]");
        let a = store.find_entity_by_normalized_name("a").unwrap().unwrap();

        let one_hop = query
            .get_graph(
                "alice",
                &GraphOptions { center_id: Some(a.id.clone()), depth: 1, min_weight: 0 },
            )
            .unwrap();
        assert_eq!(one_hop.entities.len(), 2);
        assert_eq!(one_hop.edges.len(), 1);

        let two_hops = query
            .get_graph(
                "alice",
                &GraphOptions { center_id: Some(a.id.clone()), depth: 2, min_weight: 0 },
            )
            .unwrap();
        assert_eq!(two_hops.entities.len(), 3);
        assert_eq!(two_hops.edges.len(), 2);
    }

    #[test]
    fn test_centered_bfs_min_weight() {
        let (store, engine, query) = fixture();
        run_turn(&engine, "alice", "[[topic:a]] [[topic:b]]");
        run_turn(&engine, "alice", "[[topic:a]] [[topic:b]]");
        run_turn(&engine, "alice", "[[topic:a]] [[topic:c]]");
        let a = store.find_entity_by_normalized_name("a").unwrap().unwrap();

        let heavy = query
            .get_graph(
                "alice",
                &GraphOptions { center_id: Some(a.id.clone()), depth: 1, min_weight: 2 },
            )
            .unwrap();
        // Only a→b cleared the floor.
        assert_eq!(heavy.edges.len(), 1);
        assert_eq!(heavy.entities.len(), 2);
    }

    #[test]
    fn test_entity_detail_gated_by_account() {
        let (store, engine, query) = fixture();
        run_turn(&engine, "alice", "[[topic:fractions]] [[strategy:games]]");
        let fractions = store.find_entity_by_normalized_name("fractions").unwrap().unwrap();

        let detail = query.get_entity("alice", &fractions.id).unwrap();
        assert_eq!(detail.entity.id, fractions.id);
        assert_eq!(detail.neighbors.len(), 1);
        assert_eq!(detail.recent_trajectories.len(), 1);

        // bob never touched it — the global row is not served.
        let denied = query.get_entity("bob", &fractions.id);
        assert!(matches!(denied, Err(EngineError::NotFound { .. })));
    }

    #[test]
    fn test_unknown_center_is_not_found() {
        let (_, _, query) = fixture();
        let result = query.get_graph(
            "alice",
            &GraphOptions { center_id: Some("ghost".into()), depth: 1, min_weight: 0 },
        );
        assert!(matches!(result, Err(EngineError::NotFound { .. })));
    }
}
