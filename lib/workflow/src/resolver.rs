//! Edge resolution for interactive replies and named outcomes.
//!
//! An interactive reply carries the logical id of the button or list row
//! the customer picked. Workflows authored over several editor versions
//! link that id to the next node in different ways, so resolution tries an
//! ordered list of strategies and stops at the first one that finds an
//! edge. Each strategy is a pure function of the graph and the id.
//!
//! A reply that no strategy matches does not belong to the graph. That is
//! not an error: another workflow sharing the webhook may own it.

use crate::config::ActionButton;
use crate::edge::Edge;
use crate::graph::WorkflowGraph;
use crate::node::{Node, NodeId, NodeKind};
use std::fmt;
use tracing::debug;

/// The strategy that produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionStrategy {
    /// An edge whose handle equals the reply id.
    ExactHandle,
    /// A quick-reply, buttons or list node offering the reply id.
    LegacyButtonScan,
    /// A carousel card button with the reply id.
    CarouselCard,
    /// Any interactive node offering the reply id.
    AnyInteractive,
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ExactHandle => "exact_handle",
            Self::LegacyButtonScan => "legacy_button_scan",
            Self::CarouselCard => "carousel_card",
            Self::AnyInteractive => "any_interactive",
        };
        f.write_str(name)
    }
}

/// The edge a reply resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution<'a> {
    pub edge: &'a Edge,
    pub strategy: ResolutionStrategy,
}

type Strategy = for<'a> fn(&'a WorkflowGraph, &str) -> Option<&'a Edge>;

const STRATEGIES: [(ResolutionStrategy, Strategy); 4] = [
    (ResolutionStrategy::ExactHandle, exact_handle),
    (ResolutionStrategy::LegacyButtonScan, legacy_button_scan),
    (ResolutionStrategy::CarouselCard, carousel_card),
    (ResolutionStrategy::AnyInteractive, any_interactive),
];

/// Resolves a logical reply id to the edge that should fire.
///
/// Returns `None` when the reply does not belong to this graph.
#[must_use]
pub fn resolve_reply<'a>(graph: &'a WorkflowGraph, reply_id: &str) -> Option<Resolution<'a>> {
    STRATEGIES.iter().find_map(|&(strategy, resolve)| {
        resolve(graph, reply_id).map(|edge| {
            debug!(
                reply_id,
                %strategy,
                source = %edge.source,
                target = %edge.target,
                "resolved reply"
            );
            Resolution { edge, strategy }
        })
    })
}

/// Resolves a named outcome (`success`, `error`, `no_slots`, ...) of a node.
///
/// Only edges leaving `node_id` with exactly that handle qualify.
#[must_use]
pub fn resolve_outcome<'a>(
    graph: &'a WorkflowGraph,
    node_id: &NodeId,
    outcome: &str,
) -> Option<&'a Edge> {
    graph.outgoing_with_handle(node_id, outcome)
}

/// Resolves a node's primary outcome, falling back to its first
/// unqualified edge.
///
/// Booking nodes drawn with a single plain connector complete along that
/// connector.
#[must_use]
pub fn resolve_primary_outcome<'a>(
    graph: &'a WorkflowGraph,
    node_id: &NodeId,
    outcome: &str,
) -> Option<&'a Edge> {
    resolve_outcome(graph, node_id, outcome)
        .or_else(|| graph.outgoing(node_id).find(|edge| edge.is_unqualified()))
}

fn exact_handle<'a>(graph: &'a WorkflowGraph, reply_id: &str) -> Option<&'a Edge> {
    graph.edge_with_handle(reply_id)
}

// Handle match from the offering node first, then its first edge.
fn edge_from_offering_node<'a>(
    graph: &'a WorkflowGraph,
    node: &'a Node,
    reply_id: &str,
) -> Option<&'a Edge> {
    graph
        .outgoing_with_handle(&node.id, reply_id)
        .or_else(|| graph.first_outgoing(&node.id))
}

fn legacy_button_scan<'a>(graph: &'a WorkflowGraph, reply_id: &str) -> Option<&'a Edge> {
    graph
        .nodes()
        .filter(|node| {
            matches!(
                node.kind,
                NodeKind::QuickReply(_) | NodeKind::Buttons(_) | NodeKind::List(_)
            )
        })
        .filter(|node| node.kind.offers_reply(reply_id))
        .find_map(|node| edge_from_offering_node(graph, node, reply_id))
}

fn carousel_card<'a>(graph: &'a WorkflowGraph, reply_id: &str) -> Option<&'a Edge> {
    graph.nodes().find_map(|node| {
        let NodeKind::Carousel(config) = &node.kind else {
            return None;
        };

        let mut quick_reply_position = 0;
        let mut found: Option<(&str, &ActionButton, Option<usize>)> = None;
        for card in &config.cards {
            for button in &card.buttons {
                let position = button.is_quick_reply().then_some(quick_reply_position);
                if found.is_none() && button.id() == reply_id {
                    found = Some((card.id.as_str(), button, position));
                }
                if button.is_quick_reply() {
                    quick_reply_position += 1;
                }
            }
        }
        let (card_id, button, position) = found?;

        if let Some(edge) = graph.outgoing_with_handle(&node.id, reply_id) {
            return Some(edge);
        }
        if let Some(edge) = graph.outgoing_with_handle(&node.id, card_id) {
            return Some(edge);
        }
        let title = button.title();
        if !title.is_empty() {
            let by_title = graph.outgoing(&node.id).find(|edge| {
                edge.source_handle
                    .as_deref()
                    .is_some_and(|handle| handle.contains(title))
            });
            if by_title.is_some() {
                return by_title;
            }
        }

        let outgoing: Vec<&Edge> = graph.outgoing(&node.id).collect();
        match position {
            Some(k) if outgoing.len() == quick_reply_position => outgoing.get(k).copied(),
            _ => None,
        }
    })
}

fn any_interactive<'a>(graph: &'a WorkflowGraph, reply_id: &str) -> Option<&'a Edge> {
    graph
        .nodes()
        .filter(|node| node.is_interactive() && node.kind.offers_reply(reply_id))
        .find_map(|node| edge_from_offering_node(graph, node, reply_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ButtonsMessageConfig, CarouselCard, CarouselConfig, ListMessageConfig, ListRow,
        ListSection, QuickReplyConfig, ReplyButton, TextMessageConfig,
    };

    fn text(id: &str) -> Node {
        Node::new(
            id,
            NodeKind::Text(TextMessageConfig {
                text: id.to_string(),
            }),
        )
    }

    fn quick_reply(id: &str, buttons: &[&str]) -> Node {
        Node::new(
            id,
            NodeKind::QuickReply(QuickReplyConfig {
                body: "Choose".to_string(),
                buttons: buttons
                    .iter()
                    .map(|b| ReplyButton::new(*b, b.to_uppercase()))
                    .collect(),
                ..Default::default()
            }),
        )
    }

    fn quick(id: &str, title: &str) -> ActionButton {
        ActionButton::QuickReply {
            id: id.to_string(),
            title: title.to_string(),
        }
    }

    fn carousel(id: &str) -> Node {
        Node::new(
            id,
            NodeKind::Carousel(CarouselConfig {
                body: "Products".to_string(),
                cards: vec![
                    CarouselCard {
                        id: "card_1".to_string(),
                        text: "Shoes".to_string(),
                        media: None,
                        buttons: vec![
                            quick("buy_shoes", "Buy shoes"),
                            ActionButton::Url {
                                id: "site".to_string(),
                                title: "Website".to_string(),
                                url: "https://example.com".to_string(),
                            },
                        ],
                    },
                    CarouselCard {
                        id: "card_2".to_string(),
                        text: "Hats".to_string(),
                        media: None,
                        buttons: vec![quick("buy_hats", "Buy hats")],
                    },
                ],
            }),
        )
    }

    #[test]
    fn exact_handle_wins_over_legacy_scan() {
        let graph = WorkflowGraph::new()
            .with_node(quick_reply("menu", &["yes", "no"]))
            .with_node(text("fallback"))
            .with_node(text("exact"))
            .with_edge(Edge::new("menu", "fallback"))
            .with_edge(Edge::new("menu", "exact").with_handle("yes"));

        let resolution = resolve_reply(&graph, "yes").expect("resolves");
        assert_eq!(resolution.strategy, ResolutionStrategy::ExactHandle);
        assert_eq!(resolution.edge.target.as_str(), "exact");
    }

    #[test]
    fn legacy_scan_takes_first_outgoing_edge() {
        let graph = WorkflowGraph::new()
            .with_node(quick_reply("menu", &["yes", "no"]))
            .with_node(text("first"))
            .with_node(text("second"))
            .with_edge(Edge::new("menu", "first"))
            .with_edge(Edge::new("menu", "second"));

        let resolution = resolve_reply(&graph, "no").expect("resolves");
        assert_eq!(resolution.strategy, ResolutionStrategy::LegacyButtonScan);
        assert_eq!(resolution.edge.target.as_str(), "first");
    }

    #[test]
    fn legacy_scan_covers_list_rows() {
        let graph = WorkflowGraph::new()
            .with_node(Node::new(
                "departments",
                NodeKind::List(ListMessageConfig {
                    body: "Departments".to_string(),
                    sections: vec![ListSection {
                        title: None,
                        rows: vec![ListRow::new("dept_7", "Dental")],
                    }],
                    ..Default::default()
                }),
            ))
            .with_node(text("next"))
            .with_edge(Edge::new("departments", "next"));

        let resolution = resolve_reply(&graph, "dept_7").expect("resolves");
        assert_eq!(resolution.edge.target.as_str(), "next");
    }

    #[test]
    fn carousel_matches_card_handle() {
        let graph = WorkflowGraph::new()
            .with_node(carousel("products"))
            .with_node(text("hats"))
            .with_node(text("shoes"))
            .with_edge(Edge::new("products", "hats").with_handle("card_2"))
            .with_edge(Edge::new("products", "shoes").with_handle("card_1"));

        let resolution = resolve_reply(&graph, "buy_shoes").expect("resolves");
        assert_eq!(resolution.strategy, ResolutionStrategy::CarouselCard);
        assert_eq!(resolution.edge.target.as_str(), "shoes");
    }

    #[test]
    fn carousel_matches_handle_containing_title() {
        let graph = WorkflowGraph::new()
            .with_node(carousel("products"))
            .with_node(text("hats"))
            .with_edge(Edge::new("products", "hats").with_handle("btn-Buy hats-1"));

        let resolution = resolve_reply(&graph, "buy_hats").expect("resolves");
        assert_eq!(resolution.edge.target.as_str(), "hats");
    }

    #[test]
    fn carousel_matches_by_position() {
        let graph = WorkflowGraph::new()
            .with_node(carousel("products"))
            .with_node(text("shoes"))
            .with_node(text("hats"))
            .with_edge(Edge::new("products", "shoes").with_handle("h-a"))
            .with_edge(Edge::new("products", "hats").with_handle("h-b"));

        let resolution = resolve_reply(&graph, "buy_hats").expect("resolves");
        assert_eq!(resolution.strategy, ResolutionStrategy::CarouselCard);
        assert_eq!(resolution.edge.target.as_str(), "hats");
    }

    #[test]
    fn carousel_position_needs_matching_edge_count() {
        let graph = WorkflowGraph::new()
            .with_node(carousel("products"))
            .with_node(text("shoes"))
            .with_edge(Edge::new("products", "shoes").with_handle("h-a"));

        // One edge for two quick-reply buttons: no positional match, so the
        // last-resort scan takes the first outgoing edge.
        let resolution = resolve_reply(&graph, "buy_hats").expect("resolves");
        assert_eq!(resolution.strategy, ResolutionStrategy::AnyInteractive);
        assert_eq!(resolution.edge.target.as_str(), "shoes");
    }

    #[test]
    fn buttons_node_with_handle_match() {
        let graph = WorkflowGraph::new()
            .with_node(Node::new(
                "contact",
                NodeKind::Buttons(ButtonsMessageConfig {
                    body: "Contact".to_string(),
                    buttons: vec![quick("talk", "Talk"), quick("later", "Later")],
                    ..Default::default()
                }),
            ))
            .with_node(text("a"))
            .with_node(text("b"))
            .with_edge(Edge::new("contact", "a").with_handle("other"))
            .with_edge(Edge::new("contact", "b").with_handle("talk"));

        let resolution = resolve_reply(&graph, "talk").expect("resolves");
        assert_eq!(resolution.edge.target.as_str(), "b");
    }

    #[test]
    fn unknown_reply_is_no_match() {
        let graph = WorkflowGraph::new()
            .with_node(quick_reply("menu", &["yes"]))
            .with_node(text("next"))
            .with_edge(Edge::new("menu", "next"));

        assert!(resolve_reply(&graph, "nope").is_none());
    }

    #[test]
    fn offering_node_without_edges_is_no_match() {
        let graph = WorkflowGraph::new().with_node(quick_reply("menu", &["yes"]));
        assert!(resolve_reply(&graph, "yes").is_none());
    }

    #[test]
    fn resolution_is_deterministic() {
        let graph = WorkflowGraph::new()
            .with_node(carousel("products"))
            .with_node(text("shoes"))
            .with_node(text("hats"))
            .with_edge(Edge::new("products", "shoes"))
            .with_edge(Edge::new("products", "hats"));

        let first = resolve_reply(&graph, "buy_hats").expect("resolves");
        for _ in 0..10 {
            assert_eq!(resolve_reply(&graph, "buy_hats"), Some(first));
        }
    }

    #[test]
    fn outcome_is_scoped_to_node() {
        let graph = WorkflowGraph::new()
            .with_node(text("a"))
            .with_node(text("b"))
            .with_node(text("c"))
            .with_edge(Edge::new("a", "c").with_handle("success"))
            .with_edge(Edge::new("b", "c").with_handle("error"));

        assert!(resolve_outcome(&graph, &NodeId::from("b"), "success").is_none());
        assert!(resolve_outcome(&graph, &NodeId::from("b"), "error").is_some());
    }

    #[test]
    fn primary_outcome_falls_back_to_plain_edge() {
        let graph = WorkflowGraph::new()
            .with_node(text("book"))
            .with_node(text("empty"))
            .with_node(text("done"))
            .with_edge(Edge::new("book", "empty").with_handle("no_slots"))
            .with_edge(Edge::new("book", "done"));

        let book = NodeId::from("book");
        let edge = resolve_primary_outcome(&graph, &book, "booked").expect("fallback");
        assert_eq!(edge.target.as_str(), "done");
        assert!(resolve_outcome(&graph, &book, "booked").is_none());
    }

    #[test]
    fn primary_outcome_outlives_a_temporary_id() {
        let graph = WorkflowGraph::new()
            .with_node(text("book"))
            .with_node(text("done"))
            .with_edge(Edge::new("book", "done"));

        let edge = resolve_primary_outcome(&graph, &NodeId::from("book"), "booked");
        assert_eq!(edge.map(|e| e.target.as_str()), Some("done"));
    }
}
