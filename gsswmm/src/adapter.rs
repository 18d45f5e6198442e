//! Translation between mapping descriptors and engine calls.
//!
//! Object type and property names are parsed into closed enums, checked against a fixed table
//! of what each object type supports in each direction, and resolved to engine indices. The
//! resulting [`Binding`]s only hold integers, so per-step exchange never looks names up again.

use crate::engine::{Engine, EngineObject, EngineProperty, NestedProperty};
use crate::mapping::Descriptor;
use thiserror::Error;

/// Direction of a value with respect to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Host to engine.
    Input,
    /// Engine to host.
    Output,
}

impl Direction {
    fn opposite(self) -> Self {
        match self {
            Self::Input => Self::Output,
            Self::Output => Self::Input,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}

/// Object types that may appear in a mapping file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    /// Host-side simulation clock.
    System,
    Gage,
    Pump,
    Orifice,
    Weir,
    Conduit,
    Node,
    Junction,
    Storage,
    Outfall,
    Subcatch,
    /// LID unit nested in a subcatchment, addressed as `subcatchment/control`.
    Lid,
}

impl ObjectType {
    pub const ALL: [ObjectType; 12] = [
        Self::System,
        Self::Gage,
        Self::Pump,
        Self::Orifice,
        Self::Weir,
        Self::Conduit,
        Self::Node,
        Self::Junction,
        Self::Storage,
        Self::Outfall,
        Self::Subcatch,
        Self::Lid,
    ];

    /// Returns the name of the object type as written in mapping files.
    pub fn name(self) -> &'static str {
        match self {
            Self::System => "SYSTEM",
            Self::Gage => "GAGE",
            Self::Pump => "PUMP",
            Self::Orifice => "ORIFICE",
            Self::Weir => "WEIR",
            Self::Conduit => "CONDUIT",
            Self::Node => "NODE",
            Self::Junction => "JUNCTION",
            Self::Storage => "STORAGE",
            Self::Outfall => "OUTFALL",
            Self::Subcatch => "SUBCATCH",
            Self::Lid => "LID",
        }
    }

    /// Returns the engine category holding objects of this type.
    /// For nested types, this is the category of the container.
    pub fn engine_object(self) -> Option<EngineObject> {
        match self {
            Self::System => None,
            Self::Gage => Some(EngineObject::Gage),
            Self::Pump | Self::Orifice | Self::Weir | Self::Conduit => Some(EngineObject::Link),
            Self::Node | Self::Junction | Self::Storage | Self::Outfall => Some(EngineObject::Node),
            Self::Subcatch | Self::Lid => Some(EngineObject::Subcatch),
        }
    }

    /// Returns `true` if objects of this type are addressed with composite names.
    #[inline]
    pub fn is_nested(self) -> bool {
        matches!(self, Self::Lid)
    }

    /// Returns the properties supported by this type in a given direction.
    pub fn properties(self, direction: Direction) -> &'static [Property] {
        use Property::*;
        match (self, direction) {
            (Self::System, Direction::Input) => &[ElapsedTime],
            (Self::System, Direction::Output) => &[],
            (Self::Gage, _) => &[Rainfall],
            (Self::Pump | Self::Orifice | Self::Weir, Direction::Input) => &[Setting],
            (Self::Pump | Self::Orifice | Self::Weir, Direction::Output) => &[Flow, Setting],
            (Self::Conduit, Direction::Input) => &[],
            (Self::Conduit, Direction::Output) => &[Flow, Depth],
            (Self::Node | Self::Junction, Direction::Input) => &[LatFlow],
            (Self::Node | Self::Junction, Direction::Output) => &[Depth, Head, Inflow, Overflow],
            (Self::Storage, Direction::Input) => &[LatFlow],
            (Self::Storage, Direction::Output) => &[Volume, Depth, Inflow],
            (Self::Outfall, Direction::Input) => &[],
            (Self::Outfall, Direction::Output) => &[Flow],
            (Self::Subcatch, Direction::Input) => &[],
            (Self::Subcatch, Direction::Output) => &[Runoff, Rainfall, Infil],
            (Self::Lid, Direction::Input) => &[],
            (Self::Lid, Direction::Output) => {
                &[StorageVolume, SurfaceInflow, SurfaceOutflow, DrainFlow]
            }
        }
    }

    /// Returns the engine property read or written for a supported property of this type.
    fn element_property(self, property: Property) -> Option<EngineProperty> {
        use Property::*;
        let p = match (self, property) {
            (Self::Gage, Rainfall) => EngineProperty::GageRainfall,
            (Self::Pump | Self::Orifice | Self::Weir, Setting) => EngineProperty::LinkSetting,
            (Self::Pump | Self::Orifice | Self::Weir | Self::Conduit, Flow) => {
                EngineProperty::LinkFlow
            }
            (Self::Conduit, Depth) => EngineProperty::LinkDepth,
            (Self::Node | Self::Junction | Self::Storage, LatFlow) => EngineProperty::NodeLatFlow,
            (Self::Node | Self::Junction | Self::Storage, Depth) => EngineProperty::NodeDepth,
            (Self::Node | Self::Junction | Self::Storage, Inflow) => EngineProperty::NodeInflow,
            (Self::Node | Self::Junction, Head) => EngineProperty::NodeHead,
            (Self::Node | Self::Junction, Overflow) => EngineProperty::NodeOverflow,
            (Self::Storage, Volume) => EngineProperty::NodeVolume,
            (Self::Outfall, Flow) => EngineProperty::NodeInflow,
            (Self::Subcatch, Runoff) => EngineProperty::SubcatchRunoff,
            (Self::Subcatch, Rainfall) => EngineProperty::SubcatchRainfall,
            (Self::Subcatch, Infil) => EngineProperty::SubcatchInfil,
            _ => return None,
        };
        Some(p)
    }

    fn nested_property(self, property: Property) -> Option<NestedProperty> {
        match (self, property) {
            (Self::Lid, Property::StorageVolume) => Some(NestedProperty::StorageVolume),
            (Self::Lid, Property::SurfaceInflow) => Some(NestedProperty::SurfaceInflow),
            (Self::Lid, Property::SurfaceOutflow) => Some(NestedProperty::SurfaceOutflow),
            (Self::Lid, Property::DrainFlow) => Some(NestedProperty::DrainFlow),
            _ => None,
        }
    }

    /// Returns a comma-separated list of every object type name.
    pub fn supported() -> String {
        join(Self::ALL.iter().map(|t| t.name()))
    }
}

impl std::str::FromStr for ObjectType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Property names that may appear in a mapping file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    ElapsedTime,
    Rainfall,
    Setting,
    Flow,
    Depth,
    Head,
    Inflow,
    Overflow,
    LatFlow,
    Volume,
    Runoff,
    Infil,
    StorageVolume,
    SurfaceInflow,
    SurfaceOutflow,
    DrainFlow,
}

impl Property {
    pub const ALL: [Property; 16] = [
        Self::ElapsedTime,
        Self::Rainfall,
        Self::Setting,
        Self::Flow,
        Self::Depth,
        Self::Head,
        Self::Inflow,
        Self::Overflow,
        Self::LatFlow,
        Self::Volume,
        Self::Runoff,
        Self::Infil,
        Self::StorageVolume,
        Self::SurfaceInflow,
        Self::SurfaceOutflow,
        Self::DrainFlow,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::ElapsedTime => "ELAPSEDTIME",
            Self::Rainfall => "RAINFALL",
            Self::Setting => "SETTING",
            Self::Flow => "FLOW",
            Self::Depth => "DEPTH",
            Self::Head => "HEAD",
            Self::Inflow => "INFLOW",
            Self::Overflow => "OVERFLOW",
            Self::LatFlow => "LATFLOW",
            Self::Volume => "VOLUME",
            Self::Runoff => "RUNOFF",
            Self::Infil => "INFIL",
            Self::StorageVolume => "STORAGE_VOLUME",
            Self::SurfaceInflow => "SURFACE_INFLOW",
            Self::SurfaceOutflow => "SURFACE_OUTFLOW",
            Self::DrainFlow => "DRAIN_FLOW",
        }
    }
}

impl std::str::FromStr for Property {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

impl std::fmt::Display for Property {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Engine-native handle of a resolved descriptor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Target {
    /// The host clock. It is tracked by the engine itself and never written.
    Clock,
    /// A property of a named engine object.
    Element {
        property: EngineProperty,
        index: usize,
    },
    /// A property of a nested device, by container index and position in the container.
    Nested {
        property: NestedProperty,
        container: usize,
        device: usize,
    },
}

/// A descriptor resolved against the open model. Valid for the current session only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Binding {
    pub interface_index: usize,
    pub target: Target,
}

/// Semantic problems found while resolving a descriptor against the open model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error(
        "Error: Unknown {direction} object type\nContext: Type '{found}' for element '{element}'\nSuggestion: Supported types are {supported}"
    )]
    UnknownObjectType {
        direction: Direction,
        element: String,
        found: String,
        supported: String,
    },
    #[error(
        "Error: Unsupported {direction} property\nContext: Property '{property}' of {object_type} '{element}'\nSuggestion: Supported {direction} properties of {object_type} are {supported}"
    )]
    UnsupportedProperty {
        direction: Direction,
        object_type: ObjectType,
        element: String,
        property: String,
        supported: String,
    },
    #[error(
        "Error: SWMM element not found\nContext: {object_type} '{element}'\nSuggestion: Verify that {object_type} '{element}' exists in the SWMM .inp file"
    )]
    ElementNotFound {
        object_type: ObjectType,
        element: String,
    },
    #[error(
        "Error: Container subcatchment not found\nContext: Subcatchment '{container}' of {object_type} '{element}'\nSuggestion: Verify that subcatchment '{container}' exists in the SWMM .inp file"
    )]
    ContainerNotFound {
        object_type: ObjectType,
        element: String,
        container: String,
    },
    #[error(
        "Error: {object_type} unit not found\nContext: '{device}' in subcatchment '{container}' (available: {available})\nSuggestion: Verify that the [LID_USAGE] section assigns '{device}' to subcatchment '{container}'"
    )]
    SubComponentNotFound {
        object_type: ObjectType,
        container: String,
        device: String,
        available: String,
    },
    #[error(
        "Error: Element name does not match object type\nContext: {object_type} '{element}': {problem}\nSuggestion: Use 'subcatchment/unit' names for LID elements and simple names for every other type"
    )]
    CompositeMismatch {
        object_type: ObjectType,
        element: String,
        problem: &'static str,
    },
    #[error(
        "Error: Engine does not expose {object_type} units\nContext: {object_type} '{element}'\nSuggestion: Use a SWMM library built with the LID unit accessors (swmm_getLidUCount and related functions)"
    )]
    NestedApiUnavailable {
        object_type: ObjectType,
        element: String,
    },
    #[error(
        "Error: Engine cannot read {property} of {object_type} units\nContext: {object_type} '{element}'\nSuggestion: Map another {object_type} property or use a SWMM library that exports the {property} accessor"
    )]
    NestedPropertyUnavailable {
        object_type: ObjectType,
        element: String,
        property: Property,
    },
}

fn join<'a, I: IntoIterator<Item = &'a str>>(names: I) -> String {
    names.into_iter().collect::<Vec<_>>().join(", ")
}

/// Resolves a descriptor against the open model of `engine`.
///
/// Only read-only lookups are issued to the engine.
pub fn resolve<E: Engine + ?Sized>(
    engine: &E,
    descriptor: &Descriptor,
    direction: Direction,
) -> Result<Binding, ResolveError> {
    let element = descriptor.element_name.as_str();
    let object_type: ObjectType =
        descriptor
            .object_type_name
            .parse()
            .map_err(|_| ResolveError::UnknownObjectType {
                direction,
                element: element.to_string(),
                found: descriptor.object_type_name.clone(),
                supported: ObjectType::supported(),
            })?;

    let supported = object_type.properties(direction);
    let property = descriptor
        .property_name
        .parse::<Property>()
        .ok()
        .filter(|p| supported.contains(p));
    let Some(property) = property else {
        let supported = if supported.is_empty() {
            format!("none (use {object_type} as {})", direction.opposite())
        } else {
            join(supported.iter().map(|p| p.name()))
        };
        return Err(ResolveError::UnsupportedProperty {
            direction,
            object_type,
            element: element.to_string(),
            property: descriptor.property_name.clone(),
            supported,
        });
    };

    let composite = element.split_once('/');
    if object_type.is_nested() != composite.is_some() {
        return Err(ResolveError::CompositeMismatch {
            object_type,
            element: element.to_string(),
            problem: if composite.is_some() {
                "composite names are only valid for nested types"
            } else {
                "expected a 'container/unit' name"
            },
        });
    }

    let target = match (object_type, composite) {
        (ObjectType::System, _) => Target::Clock,
        (_, Some((container, device))) => {
            resolve_nested(engine, object_type, element, container, device, property)?
        }
        (_, None) => {
            let not_found = || ResolveError::ElementNotFound {
                object_type,
                element: element.to_string(),
            };
            let (object, property) = object_type
                .engine_object()
                .zip(object_type.element_property(property))
                .ok_or_else(not_found)?;
            let index = engine.index_of(object, element).ok_or_else(not_found)?;
            Target::Element { property, index }
        }
    };

    tracing::debug!(
        "{direction} {}: {object_type} '{element}' {property} resolved to {target:?}",
        descriptor.interface_index
    );
    Ok(Binding {
        interface_index: descriptor.interface_index,
        target,
    })
}

fn resolve_nested<E: Engine + ?Sized>(
    engine: &E,
    object_type: ObjectType,
    element: &str,
    container: &str,
    device: &str,
    property: Property,
) -> Result<Target, ResolveError> {
    let nested_property =
        object_type
            .nested_property(property)
            .ok_or_else(|| ResolveError::CompositeMismatch {
                object_type,
                element: element.to_string(),
                problem: "property is not a nested-unit property",
            })?;
    let container_index = engine
        .index_of(EngineObject::Subcatch, container)
        .ok_or_else(|| ResolveError::ContainerNotFound {
            object_type,
            element: element.to_string(),
            container: container.to_string(),
        })?;
    let count =
        engine
            .nested_count(container_index)
            .ok_or_else(|| ResolveError::NestedApiUnavailable {
                object_type,
                element: element.to_string(),
            })?;
    if !engine.nested_supports(nested_property) {
        return Err(ResolveError::NestedPropertyUnavailable {
            object_type,
            element: element.to_string(),
            property,
        });
    }

    let mut available = Vec::with_capacity(count);
    for position in 0..count {
        let name = engine.nested_name(container_index, position).unwrap_or_default();
        if name == device {
            return Ok(Target::Nested {
                property: nested_property,
                container: container_index,
                device: position,
            });
        }
        available.push(name);
    }
    Err(ResolveError::SubComponentNotFound {
        object_type,
        container: container.to_string(),
        device: device.to_string(),
        available: if available.is_empty() {
            "none".to_string()
        } else {
            available.join(", ")
        },
    })
}

/// Reads the current value of a resolved binding.
pub fn read_value<E: Engine + ?Sized>(engine: &E, binding: &Binding) -> f64 {
    match binding.target {
        Target::Clock => 0.0,
        Target::Element { property, index } => engine.value(property, index),
        Target::Nested {
            property,
            container,
            device,
        } => engine.nested_value(property, container, device),
    }
}

/// Writes a value to a resolved binding. The clock and nested units are read-only.
pub fn write_value<E: Engine + ?Sized>(engine: &mut E, binding: &Binding, value: f64) {
    if let Target::Element { property, index } = binding.target {
        engine.set_value(property, index, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;

    fn engine() -> MemoryEngine {
        MemoryEngine::new()
            .with_gage("RG1")
            .with_subcatch("S1")
            .with_subcatch("S2")
            .with_node("J1")
            .with_node("OUT1")
            .with_link("C1")
            .with_link("OR1")
            .with_nested("S2", "RainBarrel")
            .with_nested("S2", "InfilTrench")
    }

    fn input(element: &str, object_type: &str, property: &str) -> Descriptor {
        Descriptor::new(0, element, object_type, property)
    }

    #[test]
    fn test_object_type_parse() {
        assert_eq!(Ok(ObjectType::Outfall), "OUTFALL".parse());
        assert_eq!(Ok(ObjectType::Subcatch), " subcatch ".parse());
        assert_eq!(Err(()), "RIVER".parse::<ObjectType>());
        assert_eq!(Ok(Property::StorageVolume), "storage_volume".parse());
        for t in ObjectType::ALL {
            assert_eq!(Ok(t), t.name().parse());
        }
    }

    #[test]
    fn test_property_table() {
        for t in ObjectType::ALL {
            for direction in [Direction::Input, Direction::Output] {
                for &p in t.properties(direction) {
                    let mapped = match t {
                        ObjectType::System => true,
                        ObjectType::Lid => t.nested_property(p).is_some(),
                        _ => t.element_property(p).is_some(),
                    };
                    assert!(mapped, "{t} {p} has no engine property");
                }
            }
        }
    }

    #[test]
    fn test_resolve_elements() {
        let engine = engine();
        let b = resolve(&engine, &input("OUT1", "OUTFALL", "FLOW"), Direction::Output).unwrap();
        assert_eq!(
            Target::Element {
                property: EngineProperty::NodeInflow,
                index: 1
            },
            b.target
        );
        let b = resolve(&engine, &input("OR1", "ORIFICE", "SETTING"), Direction::Input).unwrap();
        assert_eq!(
            Target::Element {
                property: EngineProperty::LinkSetting,
                index: 1
            },
            b.target
        );
        let b = resolve(
            &engine,
            &input("ElapsedTime", "SYSTEM", "ELAPSEDTIME"),
            Direction::Input,
        )
        .unwrap();
        assert_eq!(Target::Clock, b.target);
    }

    #[test]
    fn test_resolve_nested() {
        let engine = engine();
        let b = resolve(
            &engine,
            &input("S2/InfilTrench", "LID", "SURFACE_OUTFLOW"),
            Direction::Output,
        )
        .unwrap();
        assert_eq!(
            Target::Nested {
                property: NestedProperty::SurfaceOutflow,
                container: 1,
                device: 1
            },
            b.target
        );

        let err = resolve(
            &engine,
            &input("S2/Swale", "LID", "STORAGE_VOLUME"),
            Direction::Output,
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("S2"));
        assert!(message.contains("Swale"));
        assert!(message.contains("RainBarrel, InfilTrench"));

        let err = resolve(
            &engine,
            &input("S9/Swale", "LID", "STORAGE_VOLUME"),
            Direction::Output,
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::ContainerNotFound { .. }));
    }

    #[test]
    fn test_composite_mismatch() {
        let engine = engine();
        let err = resolve(&engine, &input("S2/RainBarrel", "SUBCATCH", "RUNOFF"), Direction::Output)
            .unwrap_err();
        assert!(matches!(err, ResolveError::CompositeMismatch { .. }));
        let err =
            resolve(&engine, &input("S2", "LID", "DRAIN_FLOW"), Direction::Output).unwrap_err();
        assert!(matches!(err, ResolveError::CompositeMismatch { .. }));
    }

    #[test]
    fn test_nested_api_unavailable() {
        let engine = engine().without_nested_api();
        let err = resolve(
            &engine,
            &input("S2/RainBarrel", "LID", "STORAGE_VOLUME"),
            Direction::Output,
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::NestedApiUnavailable { .. }));
    }

    #[test]
    fn test_nested_property_unavailable() {
        let engine = engine().without_nested_property(NestedProperty::DrainFlow);
        let volume = resolve(
            &engine,
            &input("S2/InfilTrench", "LID", "STORAGE_VOLUME"),
            Direction::Output,
        )
        .unwrap();
        assert!(matches!(volume.target, Target::Nested { device: 1, .. }));

        let err = resolve(
            &engine,
            &input("S2/InfilTrench", "LID", "DRAIN_FLOW"),
            Direction::Output,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::NestedPropertyUnavailable {
                property: Property::DrainFlow,
                ..
            }
        ));
        let message = err.to_string();
        assert!(message.contains("S2/InfilTrench"), "{message}");
        assert!(message.contains("DRAIN_FLOW"), "{message}");
    }

    #[test]
    fn test_resolution_errors() {
        let engine = engine();
        let err = resolve(&engine, &input("X", "RIVER", "FLOW"), Direction::Output).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("RIVER"));
        for t in ObjectType::ALL {
            assert!(message.contains(t.name()));
        }

        let err = resolve(&engine, &input("J1", "JUNCTION", "VOLUME"), Direction::Output)
            .unwrap_err();
        assert!(err.to_string().contains("DEPTH, HEAD, INFLOW, OVERFLOW"));

        let err = resolve(&engine, &input("C1", "CONDUIT", "FLOW"), Direction::Input).unwrap_err();
        assert!(err.to_string().contains("use CONDUIT as output"));

        let err = resolve(&engine, &input("OUT2", "OUTFALL", "FLOW"), Direction::Output)
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("OUT2"));
        assert!(message.contains("not found"));
    }

    #[test]
    fn test_read_write() {
        let mut engine = engine().with_value(EngineProperty::NodeDepth, "J1", 1.5);
        let depth = resolve(&engine, &input("J1", "JUNCTION", "DEPTH"), Direction::Output).unwrap();
        assert_eq!(1.5, read_value(&engine, &depth));

        let latflow = resolve(&engine, &input("J1", "NODE", "LATFLOW"), Direction::Input).unwrap();
        write_value(&mut engine, &latflow, 4.0);
        assert_eq!(4.0, engine.value(EngineProperty::NodeLatFlow, 0));

        let clock = Binding {
            interface_index: 0,
            target: Target::Clock,
        };
        let calls = engine.calls().len();
        write_value(&mut engine, &clock, 10.0);
        assert_eq!(calls, engine.calls().len());
        assert_eq!(0.0, read_value(&engine, &clock));
    }
}
