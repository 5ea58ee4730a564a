//! Node topology resolver.
//!
//! Classifies the multi-channel endpoints of a node by the function they
//! serve. Every query is a pure function of the node graph: endpoints are
//! scanned in ascending index order and the first accepted endpoint wins,
//! later matches queue up for secondary uses (e.g. a second window
//! covering axis, or the next digital input).

use crate::zwave::{CommandClass, DeviceClassGeneric, Node};
use std::collections::{BTreeMap, VecDeque};
use strum::{Display, EnumIter, IntoEnumIterator};

/// Logical function an endpoint can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum EndpointPurpose {
    /// Main switching endpoint (relay, dimmer, thermostat)
    RootDevice,
    /// Digital input reporting sensor-binary or notification events
    InputSensor,
    TemperatureSensor,
    /// Window covering axes: position first, tilt second
    WindowCovering,
}

/// Where a feature ends up being served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Endpoint(u8),
    /// No endpoint matched but the root node supports the command class
    Root,
    /// Feature absent on this device
    Absent,
}

impl Resolution {
    /// Transport address of the resolution; `None` addresses the root.
    pub fn endpoint(self) -> Option<u8> {
        match self {
            Resolution::Endpoint(index) => Some(index),
            Resolution::Root | Resolution::Absent => None,
        }
    }

    pub fn is_absent(self) -> bool {
        self == Resolution::Absent
    }
}

/// Sensor endpoints waiting to be claimed, lowest index first.
#[derive(Debug, Clone, Default)]
pub struct EndpointQueue {
    endpoints: VecDeque<u8>,
}

impl EndpointQueue {
    /// Take the next endpoint.
    pub fn claim(&mut self) -> Option<u8> {
        self.endpoints.pop_front()
    }

    pub fn remaining(&self) -> usize {
        self.endpoints.len()
    }
}

/// Resolved view of a node graph for one device profile.
#[derive(Debug, Clone)]
pub struct Topology {
    node: Node,
    root_device_class: Option<DeviceClassGeneric>,
    multi_channel_disabled: bool,
}

impl Topology {
    pub fn new(node: Node) -> Self {
        Self {
            node,
            root_device_class: None,
            multi_channel_disabled: false,
        }
    }

    /// Accept an extra generic class for the root device endpoint
    /// (e.g. `thermostat` for thermostat profiles).
    pub fn with_root_device_class(mut self, class: Option<DeviceClassGeneric>) -> Self {
        self.root_device_class = class;
        self
    }

    /// Address the root node instead of the root device endpoint.
    pub fn with_multi_channel_disabled(mut self, disabled: bool) -> Self {
        self.multi_channel_disabled = disabled;
        self
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn is_multi_channel(&self) -> bool {
        self.node.has_sub_endpoints()
    }

    /// Whether an endpoint of the given class can serve a purpose.
    pub fn accepts(&self, purpose: EndpointPurpose, class: DeviceClassGeneric) -> bool {
        match purpose {
            EndpointPurpose::RootDevice => {
                matches!(
                    class,
                    DeviceClassGeneric::SwitchBinary | DeviceClassGeneric::SwitchMultilevel
                ) || self.root_device_class == Some(class)
            }
            EndpointPurpose::InputSensor => matches!(
                class,
                DeviceClassGeneric::SensorBinary | DeviceClassGeneric::SensorNotification
            ),
            EndpointPurpose::TemperatureSensor => class == DeviceClassGeneric::SensorMultilevel,
            EndpointPurpose::WindowCovering => class == DeviceClassGeneric::SwitchMultilevel,
        }
    }

    /// Every endpoint accepted for a purpose, ascending.
    pub fn endpoints(&self, purpose: EndpointPurpose) -> Vec<u8> {
        self.node
            .multi_channel_nodes
            .iter()
            .filter(|(_, ep)| self.accepts(purpose, ep.device_class_generic))
            .map(|(index, _)| *index)
            .collect()
    }

    /// First endpoint accepted for a purpose.
    pub fn resolve(&self, purpose: EndpointPurpose) -> Option<u8> {
        self.node
            .multi_channel_nodes
            .iter()
            .find(|(_, ep)| self.accepts(purpose, ep.device_class_generic))
            .map(|(index, _)| *index)
    }

    /// Claimable queue of the endpoints for a purpose.
    pub fn queue(&self, purpose: EndpointPurpose) -> EndpointQueue {
        EndpointQueue {
            endpoints: self.endpoints(purpose).into(),
        }
    }

    /// Default endpoint for capability bindings.
    ///
    /// `None` when the node has no sub-endpoints, when no endpoint qualifies,
    /// or when the profile addresses the root node directly.
    pub fn root_device_endpoint(&self) -> Option<u8> {
        if self.multi_channel_disabled {
            return None;
        }
        self.resolve(EndpointPurpose::RootDevice)
    }

    /// Resolve a purpose, falling back to the root node's command classes.
    pub fn resolve_command_class(
        &self,
        purpose: EndpointPurpose,
        command_class: CommandClass,
    ) -> Resolution {
        if let Some(index) = self.resolve(purpose) {
            Resolution::Endpoint(index)
        } else if self.node.supports(command_class) {
            Resolution::Root
        } else {
            Resolution::Absent
        }
    }

    /// Complete purpose to endpoint mapping.
    pub fn assignment(&self) -> BTreeMap<EndpointPurpose, Vec<u8>> {
        EndpointPurpose::iter()
            .map(|purpose| (purpose, self.endpoints(purpose)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zwave::MultiChannelNode;

    fn flush_relay_node() -> Node {
        Node::new(5)
            .with_command_class(CommandClass::SensorMultilevel)
            .with_endpoint(3, MultiChannelNode::new(DeviceClassGeneric::SensorBinary))
            .with_endpoint(1, MultiChannelNode::new(DeviceClassGeneric::SwitchBinary))
            .with_endpoint(
                2,
                MultiChannelNode::new(DeviceClassGeneric::SensorNotification),
            )
            .with_endpoint(4, MultiChannelNode::new(DeviceClassGeneric::SensorMultilevel))
    }

    #[test]
    fn test_resolve_in_ascending_order() {
        let topology = Topology::new(flush_relay_node());
        assert_eq!(topology.resolve(EndpointPurpose::RootDevice), Some(1));
        assert_eq!(topology.endpoints(EndpointPurpose::InputSensor), vec![2, 3]);
        assert_eq!(topology.resolve(EndpointPurpose::TemperatureSensor), Some(4));
        assert_eq!(topology.resolve(EndpointPurpose::WindowCovering), None);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let topology = Topology::new(flush_relay_node());
        let first = topology.assignment();

        // Query in a different order and repeatedly
        for purpose in EndpointPurpose::iter().rev() {
            topology.resolve(purpose);
            topology.queue(purpose).claim();
        }
        for _ in 0..3 {
            assert_eq!(topology.assignment(), first);
        }

        // Same graph built in a different insertion order
        let rebuilt = Topology::new(
            Node::new(5)
                .with_command_class(CommandClass::SensorMultilevel)
                .with_endpoint(4, MultiChannelNode::new(DeviceClassGeneric::SensorMultilevel))
                .with_endpoint(
                    2,
                    MultiChannelNode::new(DeviceClassGeneric::SensorNotification),
                )
                .with_endpoint(1, MultiChannelNode::new(DeviceClassGeneric::SwitchBinary))
                .with_endpoint(3, MultiChannelNode::new(DeviceClassGeneric::SensorBinary)),
        );
        assert_eq!(rebuilt.assignment(), first);
    }

    #[test]
    fn test_root_device_class_override() {
        let node = Node::new(9)
            .with_endpoint(1, MultiChannelNode::new(DeviceClassGeneric::SensorBinary))
            .with_endpoint(2, MultiChannelNode::new(DeviceClassGeneric::Thermostat));

        assert_eq!(Topology::new(node.clone()).root_device_endpoint(), None);
        let topology = Topology::new(node)
            .with_root_device_class(Some(DeviceClassGeneric::Thermostat));
        assert_eq!(topology.root_device_endpoint(), Some(2));
    }

    #[test]
    fn test_multi_channel_disabled_addresses_root() {
        let topology = Topology::new(flush_relay_node()).with_multi_channel_disabled(true);
        assert_eq!(topology.root_device_endpoint(), None);
        // Inputs still resolve through their endpoints
        assert_eq!(topology.endpoints(EndpointPurpose::InputSensor), vec![2, 3]);
    }

    #[test]
    fn test_fallback_to_root_command_classes() {
        let single = Topology::new(Node::new(2).with_command_class(CommandClass::SensorMultilevel));
        assert_eq!(
            single.resolve_command_class(
                EndpointPurpose::TemperatureSensor,
                CommandClass::SensorMultilevel
            ),
            Resolution::Root
        );

        let bare = Topology::new(Node::new(2));
        let resolution =
            bare.resolve_command_class(EndpointPurpose::TemperatureSensor, CommandClass::SensorMultilevel);
        assert!(resolution.is_absent());
        assert_eq!(resolution.endpoint(), None);
    }

    #[test]
    fn test_queue_claims_each_endpoint_once() {
        let topology = Topology::new(flush_relay_node());
        let mut queue = topology.queue(EndpointPurpose::InputSensor);
        assert_eq!(queue.remaining(), 2);
        assert_eq!(queue.claim(), Some(2));
        assert_eq!(queue.claim(), Some(3));
        assert_eq!(queue.claim(), None);
    }
}
