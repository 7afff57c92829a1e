use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

pub type StudyId = Uuid;
pub type NodeId = Uuid;

/// Kind of vertex in a study tree
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Root,
    Modification,
}

/// Network modification node flavour
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeSubtype {
    Construction,
    Security,
}

/// Where a new node is placed relative to a reference node
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InsertMode {
    #[default]
    Child,
    Before,
    After,
}

impl std::str::FromStr for InsertMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CHILD" => Ok(InsertMode::Child),
            "BEFORE" => Ok(InsertMode::Before),
            "AFTER" => Ok(InsertMode::After),
            _ => Err(format!("Unknown insert mode: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<NodeSubtype>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub children: Vec<NodeId>,
    /// Group of network modifications held by the remote modification store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modification_group: Option<Uuid>,
    pub stashed: bool,
}

impl Node {
    pub fn root() -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: None,
            node_type: NodeType::Root,
            subtype: None,
            name: "Root".to_string(),
            description: None,
            children: Vec::new(),
            modification_group: None,
            stashed: false,
        }
    }

    pub fn modification(spec: NodeSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: None,
            node_type: NodeType::Modification,
            subtype: Some(spec.subtype),
            name: spec.name,
            description: spec.description,
            children: Vec::new(),
            modification_group: Some(spec.modification_group.unwrap_or_else(Uuid::new_v4)),
            stashed: false,
        }
    }

    pub fn is_root(&self) -> bool {
        self.node_type == NodeType::Root
    }
}

/// Attributes supplied by a client when creating a node
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 1024))]
    pub description: Option<String>,
    #[serde(default = "default_subtype")]
    pub subtype: NodeSubtype,
    pub modification_group: Option<Uuid>,
}

fn default_subtype() -> NodeSubtype {
    NodeSubtype::Construction
}

impl NodeSpec {
    pub fn named(name: impl Into<String>, subtype: NodeSubtype) -> Self {
        Self {
            name: name.into(),
            description: None,
            subtype,
            modification_group: None,
        }
    }
}
