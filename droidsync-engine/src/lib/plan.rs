use std::collections::BTreeMap;

use droidsync::{Action, Plan};

#[derive(Default)]
struct Node {
    actions: Vec<Action>,
    children: BTreeMap<String, Node>,
}

impl Node {
    fn insert(&mut self, action: Action) {
        let mut node = self;
        for name in action.path.names() {
            node = node.children.entry(name.to_string()).or_default();
        }
        node.actions.push(action);
    }

    fn emit(self, out: &mut Vec<Action>) {
        let (removals, others): (Vec<_>, Vec<_>) =
            self.actions.into_iter().partition(|a| a.kind.is_remove());
        out.extend(others);
        for (_, child) in self.children {
            child.emit(out);
        }
        out.extend(removals);
    }
}

/// Order a set of actions by path dependency.
///
/// Siblings come in sanitized name order. Removals come after their
/// descendants, every other action before them. The result does not depend
/// on the order of `actions`.
pub fn plan(actions: Vec<Action>) -> Plan {
    let mut root = Node::default();
    for action in actions {
        root.insert(action);
    }
    let mut ordered = Vec::new();
    root.emit(&mut ordered);

    let plan = Plan::from_ordered(ordered);
    debug_assert!(plan.check_order().is_ok(), "{:?}", plan.check_order());
    plan
}
