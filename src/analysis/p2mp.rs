//! Point-to-multipoint grouping.

use std::collections::BTreeMap;

use crate::topology::{Link, TopologyGraph};

/// Find every node whose radio serves two or more wireless links.
///
/// Returns node name -> incident wireless links. Point-to-point nodes are
/// left out since their airtime is not shared.
pub fn find_all_p2mp(graph: &TopologyGraph) -> BTreeMap<String, Vec<Link>> {
    let inner = graph.inner();
    inner
        .node_indices()
        .filter(|&index| index != graph.source())
        .filter_map(|index| {
            let links = graph.wireless_links(index);
            if links.len() < 2 {
                return None;
            }
            Some((inner[index].clone(), links.into_iter().cloned().collect()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::graph::test_support::*;
    use crate::topology::{build_topology_graph, LinkType, NodeType};

    #[test]
    fn test_find_all_p2mp() {
        let topology = topology(
            vec![
                node("pop", NodeType::Dn, true),
                node("dn-1", NodeType::Dn, false),
                node("cn-1", NodeType::Cn, false),
                node("cn-2", NodeType::Cn, false),
                node("dn-2", NodeType::Dn, false),
            ],
            vec![
                wireless("pop", "dn-1"),
                wireless("dn-1", "cn-1"),
                wireless("dn-1", "cn-2"),
                link("link-pop-dn-2", "pop", "dn-2", LinkType::Ethernet),
            ],
        );
        let (graph, _) = build_topology_graph(&topology);

        let p2mp = find_all_p2mp(&graph);
        assert_eq!(p2mp.keys().collect::<Vec<_>>(), vec!["dn-1"]);
        let names: Vec<&str> = p2mp["dn-1"].iter().map(|link| link.name.as_str()).collect();
        assert_eq!(names, vec!["link-pop-dn-1", "link-dn-1-cn-1", "link-dn-1-cn-2"]);
    }

    #[test]
    fn test_wired_links_do_not_count() {
        let topology = topology(
            vec![node("pop", NodeType::Dn, true), node("cn", NodeType::Cn, false)],
            vec![
                wireless("pop", "cn"),
                link("link-pop-cn-eth", "pop", "cn", LinkType::Ethernet),
            ],
        );
        let (graph, _) = build_topology_graph(&topology);
        assert!(find_all_p2mp(&graph).is_empty());
    }
}
