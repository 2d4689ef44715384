//! Stats export (ambient concern, not a core engine component): renders the
//! attribute tree built by [`crate::stats::StatsAggregator`] to JSON, the
//! bundled text-dump binary's `--export` flag.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde_json::{Map, Value};

use crate::attribute::{AttributeTree, AttributeValue, Interner, Node, NodeRef};
use crate::domain::errors::ExportError;

/// Render one node to a [`Value`]. Branches render their named children
/// only; an attribute tree built purely from `find_or_create` path
/// components (as the stats aggregator's is) never has unnamed entries, so
/// nothing is lost. `Opaque` leaves have no JSON representation and render
/// as `null`.
fn node_to_json(node: &NodeRef, interner: &Interner) -> Value {
    match &*node.borrow() {
        Node::Leaf(value) => leaf_to_json(value),
        Node::Branch(branch) => {
            let mut map = Map::new();
            for (key, child) in branch.iter_named() {
                map.insert(interner.resolve(key).to_owned(), node_to_json(child, interner));
            }
            Value::Object(map)
        }
    }
}

fn leaf_to_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::Int32(v) => Value::from(*v),
        AttributeValue::UInt32(v) => Value::from(*v),
        AttributeValue::Long(v) => Value::from(*v),
        AttributeValue::ULong(v) => Value::from(*v),
        AttributeValue::Float(v) => Value::from(*v),
        AttributeValue::Double(v) => Value::from(*v),
        AttributeValue::Time(tsc) => Value::from(tsc.0),
        AttributeValue::String(s) => Value::from(s.clone()),
        AttributeValue::Opaque(_) => Value::Null,
    }
}

/// Write the tree rooted at `tree.root()` to `path` as pretty-printed JSON.
pub fn export_stats(tree: &AttributeTree, interner: &Interner, path: &Path) -> Result<(), ExportError> {
    let value = node_to_json(tree.root(), interner);
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &value)?;
    Ok(())
}
