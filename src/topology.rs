//! Node/link graph the packets travel over.
//!
//! The topology is plain data: nodes carry an explicit role and address,
//! links carry a rate and a propagation delay. A next-hop table is
//! computed once at construction by breadth-first search, visiting
//! neighbours in ascending `NodeId` order so that equal-length paths are
//! always resolved the same way.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::error::TopologyError;
use crate::rate::DataRate;
use crate::time::VirtualTime;

// ── Identifiers ───────────────────────────────────────────────────────

/// Index of a node in its topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        NodeId(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "N{}", self.0)
    }
}

/// Index of a link in its topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkId(u32);

impl LinkId {
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

// ── Nodes and links ───────────────────────────────────────────────────

/// What a node does in the experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Source of flood traffic.
    Attacker,
    /// Source of legitimate low-rate traffic.
    Background,
    /// Target of all generated traffic.
    Victim,
    /// Relay between hosts.
    Router,
    /// Any other endpoint.
    Host,
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeRole::Attacker => "attacker",
            NodeRole::Background => "background",
            NodeRole::Victim => "victim",
            NodeRole::Router => "router",
            NodeRole::Host => "host",
        };
        f.write_str(s)
    }
}

/// Description of a node before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    pub name: String,
    pub role: NodeRole,
    pub address: Ipv4Addr,
}

impl NodeSpec {
    pub fn new(name: impl Into<String>, role: NodeRole, address: Ipv4Addr) -> Self {
        NodeSpec {
            name: name.into(),
            role,
            address,
        }
    }
}

/// Description of a link before validation; endpoints are node names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSpec {
    pub a: String,
    pub b: String,
    pub rate: DataRate,
    pub delay: VirtualTime,
}

impl LinkSpec {
    pub fn new(a: impl Into<String>, b: impl Into<String>, rate: DataRate, delay: VirtualTime) -> Self {
        LinkSpec {
            a: a.into(),
            b: b.into(),
            rate,
            delay,
        }
    }
}

/// A validated node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub role: NodeRole,
    pub address: Ipv4Addr,
}

/// A validated, undirected point-to-point link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub id: LinkId,
    pub a: NodeId,
    pub b: NodeId,
    /// Serialization rate, applied independently in each direction.
    pub rate: DataRate,
    /// Propagation delay, applied independently in each direction.
    pub delay: VirtualTime,
}

impl Link {
    /// The endpoint opposite `node`, or `None` if `node` is not on this link.
    pub fn other_end(&self, node: NodeId) -> Option<NodeId> {
        if node == self.a {
            Some(self.b)
        } else if node == self.b {
            Some(self.a)
        } else {
            None
        }
    }
}

// ── Topology ──────────────────────────────────────────────────────────

/// Validated network graph with address lookup and next-hop routing.
#[derive(Debug, Clone)]
pub struct Topology {
    nodes: Vec<Node>,
    links: Vec<Link>,
    by_name: HashMap<String, NodeId>,
    by_address: HashMap<Ipv4Addr, NodeId>,
    /// `(from, to)` → `(link to take, node at its far end)`.
    next_hop: BTreeMap<(NodeId, NodeId), (LinkId, NodeId)>,
}

impl Topology {
    /// Validate nodes and links and build the routing table.
    pub fn new(nodes: Vec<NodeSpec>, links: Vec<LinkSpec>) -> Result<Self, TopologyError> {
        if nodes.is_empty() {
            return Err(TopologyError::Empty);
        }

        let mut by_name = HashMap::with_capacity(nodes.len());
        let mut by_address = HashMap::with_capacity(nodes.len());
        let mut built = Vec::with_capacity(nodes.len());

        for (idx, spec) in nodes.into_iter().enumerate() {
            let id = NodeId(idx as u32);
            if by_name.insert(spec.name.clone(), id).is_some() {
                return Err(TopologyError::DuplicateName(spec.name));
            }
            if by_address.insert(spec.address, id).is_some() {
                return Err(TopologyError::DuplicateAddress(spec.address));
            }
            built.push(Node {
                id,
                name: spec.name,
                role: spec.role,
                address: spec.address,
            });
        }

        let mut seen_pairs = BTreeSet::new();
        let mut built_links = Vec::with_capacity(links.len());
        for (idx, spec) in links.into_iter().enumerate() {
            let resolve = |name: &str| {
                by_name
                    .get(name)
                    .copied()
                    .ok_or_else(|| TopologyError::DanglingEndpoint {
                        link: idx,
                        endpoint: name.to_string(),
                    })
            };
            let a = resolve(&spec.a)?;
            let b = resolve(&spec.b)?;
            if a == b {
                return Err(TopologyError::SelfLoop {
                    link: idx,
                    node: spec.a,
                });
            }
            if !seen_pairs.insert((a.min(b), a.max(b))) {
                return Err(TopologyError::DuplicateLink { a: spec.a, b: spec.b });
            }
            built_links.push(Link {
                id: LinkId(idx as u32),
                a,
                b,
                rate: spec.rate,
                delay: spec.delay,
            });
        }

        let next_hop = compute_next_hops(built.len(), &built_links);

        Ok(Topology {
            nodes: built,
            links: built_links,
            by_name,
            by_address,
            next_hop,
        })
    }

    /// A star: every leaf gets its own link to `hub`.
    pub fn star(
        hub: NodeSpec,
        leaves: Vec<NodeSpec>,
        rate: DataRate,
        delay: VirtualTime,
    ) -> Result<Self, TopologyError> {
        let links = leaves
            .iter()
            .map(|leaf| LinkSpec::new(leaf.name.clone(), hub.name.clone(), rate, delay))
            .collect();
        let mut nodes = leaves;
        nodes.push(hub);
        Topology::new(nodes, links)
    }

    /// The five-node flood experiment: two attackers, one background
    /// host and the victim, each on its own 10 Mbps / 5 ms link to a
    /// single router.
    pub fn ddos_star() -> Self {
        let leaves = vec![
            NodeSpec::new("attacker1", NodeRole::Attacker, Ipv4Addr::new(10, 0, 1, 1)),
            NodeSpec::new("attacker2", NodeRole::Attacker, Ipv4Addr::new(10, 0, 2, 1)),
            NodeSpec::new("background", NodeRole::Background, Ipv4Addr::new(10, 0, 3, 1)),
            NodeSpec::new("victim", NodeRole::Victim, Ipv4Addr::new(10, 0, 4, 1)),
        ];
        let hub = NodeSpec::new("router", NodeRole::Router, Ipv4Addr::new(10, 0, 0, 254));
        Topology::star(hub, leaves, DataRate::MBPS_10, VirtualTime::from_millis(5))
            .expect("built-in star topology is valid")
    }

    // ── Lookups ───────────────────────────────────────────────────

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id.0 as usize)
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Resolve a node by its configured name.
    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    /// Resolve a node by its address.
    pub fn node_by_address(&self, address: Ipv4Addr) -> Option<NodeId> {
        self.by_address.get(&address).copied()
    }

    /// Address of `id`, if it exists.
    pub fn address_of(&self, id: NodeId) -> Option<Ipv4Addr> {
        self.node(id).map(|n| n.address)
    }

    /// All nodes with `role`, in ascending id order.
    pub fn nodes_with_role(&self, role: NodeRole) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.role == role)
            .map(|n| n.id)
            .collect()
    }

    // ── Routing ───────────────────────────────────────────────────

    /// The link to traverse next when going from `from` toward `to`, and
    /// the node at its far end. `None` if `from == to` or unreachable.
    pub fn next_hop(&self, from: NodeId, to: NodeId) -> Option<(&Link, NodeId)> {
        let (link, next) = self.next_hop.get(&(from, to))?;
        Some((self.link(*link)?, *next))
    }

    /// Whether packets from `from` can reach `to`.
    pub fn is_reachable(&self, from: NodeId, to: NodeId) -> bool {
        from != to && self.next_hop.contains_key(&(from, to))
    }

    /// Full node path from `from` to `to`, both ends included.
    pub fn path(&self, from: NodeId, to: NodeId) -> Option<Vec<NodeId>> {
        let mut path = vec![from];
        let mut at = from;
        while at != to {
            let (_, next) = self.next_hop.get(&(at, to))?;
            at = *next;
            path.push(at);
        }
        Some(path)
    }
}

/// Breadth-first search from every node.
fn compute_next_hops(
    node_count: usize,
    links: &[Link],
) -> BTreeMap<(NodeId, NodeId), (LinkId, NodeId)> {
    let mut adjacency: Vec<BTreeMap<NodeId, LinkId>> = vec![BTreeMap::new(); node_count];
    for link in links {
        adjacency[link.a.index()].insert(link.b, link.id);
        adjacency[link.b.index()].insert(link.a, link.id);
    }

    let mut table = BTreeMap::new();
    for src in 0..node_count {
        let src = NodeId(src as u32);
        // first hop used to reach each visited node
        let mut first: BTreeMap<NodeId, (LinkId, NodeId)> = BTreeMap::new();
        let mut queue = VecDeque::new();
        queue.push_back(src);
        while let Some(at) = queue.pop_front() {
            for (&neighbour, &link) in &adjacency[at.index()] {
                if neighbour == src || first.contains_key(&neighbour) {
                    continue;
                }
                let hop = if at == src {
                    (link, neighbour)
                } else {
                    first[&at]
                };
                first.insert(neighbour, hop);
                queue.push_back(neighbour);
            }
        }
        for (dst, hop) in first {
            table.insert((src, dst), hop);
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate() -> DataRate {
        DataRate::from_mbps(10).unwrap()
    }

    #[test]
    fn test_ddos_star_shape() {
        let t = Topology::ddos_star();
        assert_eq!(t.node_count(), 5);
        assert_eq!(t.links().len(), 4);
        assert_eq!(t.nodes_with_role(NodeRole::Attacker).len(), 2);
        assert_eq!(t.nodes_with_role(NodeRole::Victim).len(), 1);
        let router = t.node_by_name("router").unwrap();
        for link in t.links() {
            assert!(link.a == router || link.b == router);
            assert_eq!(link.delay, VirtualTime::from_millis(5));
            assert_eq!(link.rate.bps(), 10_000_000);
        }
    }

    #[test]
    fn test_leaf_to_leaf_goes_through_router() {
        let t = Topology::ddos_star();
        let a1 = t.node_by_name("attacker1").unwrap();
        let victim = t.node_by_name("victim").unwrap();
        let router = t.node_by_name("router").unwrap();

        let (link, next) = t.next_hop(a1, victim).unwrap();
        assert_eq!(next, router);
        assert_eq!(link.other_end(a1), Some(router));
        assert_eq!(link.other_end(router), Some(a1));
        assert_eq!(link.other_end(victim), None);
        let (_, next) = t.next_hop(router, victim).unwrap();
        assert_eq!(next, victim);
        assert_eq!(t.path(a1, victim).unwrap(), vec![a1, router, victim]);
    }

    #[test]
    fn test_address_lookup() {
        let t = Topology::ddos_star();
        let victim = t.node_by_address(Ipv4Addr::new(10, 0, 4, 1)).unwrap();
        assert_eq!(t.node(victim).unwrap().name, "victim");
        assert_eq!(t.address_of(victim), Some(Ipv4Addr::new(10, 0, 4, 1)));
        assert!(t.node_by_address(Ipv4Addr::new(192, 168, 0, 1)).is_none());
    }

    #[test]
    fn test_duplicate_address_rejected() {
        let addr = Ipv4Addr::new(10, 0, 0, 1);
        let err = Topology::new(
            vec![
                NodeSpec::new("a", NodeRole::Host, addr),
                NodeSpec::new("b", NodeRole::Host, addr),
            ],
            vec![],
        )
        .unwrap_err();
        assert_eq!(err, TopologyError::DuplicateAddress(addr));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let err = Topology::new(
            vec![
                NodeSpec::new("a", NodeRole::Host, Ipv4Addr::new(10, 0, 0, 1)),
                NodeSpec::new("a", NodeRole::Host, Ipv4Addr::new(10, 0, 0, 2)),
            ],
            vec![],
        )
        .unwrap_err();
        assert_eq!(err, TopologyError::DuplicateName("a".into()));
    }

    #[test]
    fn test_dangling_endpoint_rejected() {
        let err = Topology::new(
            vec![NodeSpec::new("a", NodeRole::Host, Ipv4Addr::new(10, 0, 0, 1))],
            vec![LinkSpec::new("a", "ghost", rate(), VirtualTime::ZERO)],
        )
        .unwrap_err();
        assert_eq!(
            err,
            TopologyError::DanglingEndpoint {
                link: 0,
                endpoint: "ghost".into()
            }
        );
    }

    #[test]
    fn test_self_loop_and_duplicate_link_rejected() {
        let nodes = || {
            vec![
                NodeSpec::new("a", NodeRole::Host, Ipv4Addr::new(10, 0, 0, 1)),
                NodeSpec::new("b", NodeRole::Host, Ipv4Addr::new(10, 0, 0, 2)),
            ]
        };
        let err = Topology::new(nodes(), vec![LinkSpec::new("a", "a", rate(), VirtualTime::ZERO)])
            .unwrap_err();
        assert!(matches!(err, TopologyError::SelfLoop { .. }));

        let err = Topology::new(
            nodes(),
            vec![
                LinkSpec::new("a", "b", rate(), VirtualTime::ZERO),
                LinkSpec::new("b", "a", rate(), VirtualTime::ZERO),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, TopologyError::DuplicateLink { .. }));
    }

    #[test]
    fn test_unreachable_pair() {
        let t = Topology::new(
            vec![
                NodeSpec::new("a", NodeRole::Host, Ipv4Addr::new(10, 0, 0, 1)),
                NodeSpec::new("b", NodeRole::Host, Ipv4Addr::new(10, 0, 0, 2)),
            ],
            vec![],
        )
        .unwrap();
        let a = t.node_by_name("a").unwrap();
        let b = t.node_by_name("b").unwrap();
        assert!(!t.is_reachable(a, b));
        assert!(t.next_hop(a, b).is_none());
        assert!(t.path(a, b).is_none());
    }

    #[test]
    fn test_line_topology_routes_deterministically() {
        // a - b - c - d
        let nodes = ["a", "b", "c", "d"]
            .iter()
            .enumerate()
            .map(|(i, n)| NodeSpec::new(*n, NodeRole::Host, Ipv4Addr::new(10, 0, 0, i as u8 + 1)))
            .collect();
        let links = vec![
            LinkSpec::new("a", "b", rate(), VirtualTime::ZERO),
            LinkSpec::new("b", "c", rate(), VirtualTime::ZERO),
            LinkSpec::new("c", "d", rate(), VirtualTime::ZERO),
        ];
        let t = Topology::new(nodes, links).unwrap();
        let a = t.node_by_name("a").unwrap();
        let d = t.node_by_name("d").unwrap();
        assert_eq!(t.path(a, d).unwrap().len(), 4);
        assert_eq!(t.path(d, a).unwrap().len(), 4);
    }
}
