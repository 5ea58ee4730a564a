//! Node graph of a paired device.
//!
//! A [`Node`] is the root addressable unit; its multi-channel endpoints are
//! kept in a `BTreeMap` so every traversal runs in ascending endpoint order.

use super::command_class::{CommandClass, DeviceClassGeneric};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Sub-endpoint of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiChannelNode {
    pub device_class_generic: DeviceClassGeneric,
    #[serde(default)]
    pub command_classes: BTreeSet<CommandClass>,
}

impl MultiChannelNode {
    pub fn new(device_class_generic: DeviceClassGeneric) -> Self {
        Self {
            device_class_generic,
            command_classes: BTreeSet::new(),
        }
    }

    pub fn with_command_class(mut self, command_class: CommandClass) -> Self {
        self.command_classes.insert(command_class);
        self
    }

    pub fn supports(&self, command_class: CommandClass) -> bool {
        self.command_classes.contains(&command_class)
    }
}

/// Root addressable unit of a paired device.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Node {
    pub node_id: u8,
    #[serde(default)]
    pub command_classes: BTreeSet<CommandClass>,
    /// Sub-endpoints keyed by endpoint index (1..N)
    #[serde(default)]
    pub multi_channel_nodes: BTreeMap<u8, MultiChannelNode>,
    /// Set when this node is the view of a single sub-endpoint that the hub
    /// exposes as its own device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_channel_node_id: Option<u8>,
}

impl Node {
    pub fn new(node_id: u8) -> Self {
        Self {
            node_id,
            ..Default::default()
        }
    }

    pub fn with_command_class(mut self, command_class: CommandClass) -> Self {
        self.command_classes.insert(command_class);
        self
    }

    /// Add a sub-endpoint. An existing endpoint with the same index is replaced.
    pub fn with_endpoint(mut self, index: u8, endpoint: MultiChannelNode) -> Self {
        self.multi_channel_nodes.insert(index, endpoint);
        self
    }

    pub fn has_sub_endpoints(&self) -> bool {
        !self.multi_channel_nodes.is_empty()
    }

    pub fn endpoint(&self, index: u8) -> Option<&MultiChannelNode> {
        self.multi_channel_nodes.get(&index)
    }

    /// Whether the root node itself supports a command class.
    pub fn supports(&self, command_class: CommandClass) -> bool {
        self.command_classes.contains(&command_class)
    }

    /// Whether the given endpoint (or the root for `None`) supports a command class.
    pub fn endpoint_supports(&self, endpoint: Option<u8>, command_class: CommandClass) -> bool {
        match endpoint {
            Some(index) => self
                .endpoint(index)
                .is_some_and(|ep| ep.supports(command_class)),
            None => self.supports(command_class),
        }
    }

    /// View of one sub-endpoint as a device of its own.
    pub fn sub_device(&self, index: u8) -> Option<Node> {
        self.endpoint(index).map(|ep| Node {
            node_id: self.node_id,
            command_classes: ep.command_classes.clone(),
            multi_channel_nodes: BTreeMap::new(),
            multi_channel_node_id: Some(index),
        })
    }
}
