//! Built-in record layouts.

use const_format::concatcp;
use rustpower_dataset_macro::ComponentLayout;

use super::{ComponentLayout, ID, IntS, MetaAttribute, MetaData, MetaDataset, RealValueAsym};

const OUTPUT_SUFFIX: &str = "_output";

pub const INPUT: &str = "input";
pub const UPDATE: &str = "update";
pub const SYM_OUTPUT: &str = concatcp!("sym", OUTPUT_SUFFIX);
pub const ASYM_OUTPUT: &str = concatcp!("asym", OUTPUT_SUFFIX);
pub const SC_OUTPUT: &str = concatcp!("sc", OUTPUT_SUFFIX);

/// Returns `true` for the datasets the calculation engine writes into.
pub fn is_output_dataset(name: &str) -> bool {
    name.ends_with(OUTPUT_SUFFIX)
}

#[derive(Debug, Clone, Copy, ComponentLayout)]
#[repr(C)]
pub struct NodeInput {
    pub id: ID,
    pub u_rated: f64,
}

#[derive(Debug, Clone, Copy, ComponentLayout)]
#[repr(C)]
pub struct LineInput {
    pub id: ID,
    pub from_node: ID,
    pub to_node: ID,
    pub from_status: IntS,
    pub to_status: IntS,
    pub r1: f64,
    pub x1: f64,
    pub c1: f64,
    pub tan1: f64,
    pub i_n: f64,
}

#[derive(Debug, Clone, Copy, ComponentLayout)]
#[repr(C)]
pub struct SourceInput {
    pub id: ID,
    pub node: ID,
    pub status: IntS,
    pub u_ref: f64,
    pub u_ref_angle: f64,
    pub sk: f64,
    pub rx_ratio: f64,
    pub z01_ratio: f64,
}

#[derive(Debug, Clone, Copy, ComponentLayout)]
#[repr(C)]
pub struct SymLoadInput {
    pub id: ID,
    pub node: ID,
    pub status: IntS,
    pub r#type: IntS,
    pub p_specified: f64,
    pub q_specified: f64,
}

#[derive(Debug, Clone, Copy, ComponentLayout)]
#[repr(C)]
pub struct AsymLoadInput {
    pub id: ID,
    pub node: ID,
    pub status: IntS,
    pub r#type: IntS,
    pub p_specified: RealValueAsym,
    pub q_specified: RealValueAsym,
}

#[derive(Debug, Clone, Copy, ComponentLayout)]
#[repr(C)]
pub struct ShuntInput {
    pub id: ID,
    pub node: ID,
    pub status: IntS,
    pub g1: f64,
    pub b1: f64,
    pub g0: f64,
    pub b0: f64,
}

#[derive(Debug, Clone, Copy, ComponentLayout)]
#[repr(C)]
pub struct LineUpdate {
    pub id: ID,
    pub from_status: IntS,
    pub to_status: IntS,
}

#[derive(Debug, Clone, Copy, ComponentLayout)]
#[repr(C)]
pub struct SourceUpdate {
    pub id: ID,
    pub status: IntS,
    pub u_ref: f64,
    pub u_ref_angle: f64,
}

#[derive(Debug, Clone, Copy, ComponentLayout)]
#[repr(C)]
pub struct SymLoadUpdate {
    pub id: ID,
    pub status: IntS,
    pub p_specified: f64,
    pub q_specified: f64,
}

#[derive(Debug, Clone, Copy, ComponentLayout)]
#[repr(C)]
pub struct AsymLoadUpdate {
    pub id: ID,
    pub status: IntS,
    pub p_specified: RealValueAsym,
    pub q_specified: RealValueAsym,
}

#[derive(Debug, Clone, Copy, ComponentLayout)]
#[repr(C)]
pub struct ShuntUpdate {
    pub id: ID,
    pub status: IntS,
    pub g1: f64,
    pub b1: f64,
    pub g0: f64,
    pub b0: f64,
}

#[derive(Debug, Clone, Copy, ComponentLayout)]
#[repr(C)]
pub struct NodeOutput {
    pub id: ID,
    pub energized: IntS,
    pub u_pu: f64,
    pub u: f64,
    pub u_angle: f64,
    pub p: f64,
    pub q: f64,
}

#[derive(Debug, Clone, Copy, ComponentLayout)]
#[repr(C)]
pub struct BranchOutput {
    pub id: ID,
    pub energized: IntS,
    pub loading: f64,
    pub p_from: f64,
    pub q_from: f64,
    pub i_from: f64,
    pub s_from: f64,
    pub p_to: f64,
    pub q_to: f64,
    pub i_to: f64,
    pub s_to: f64,
}

#[derive(Debug, Clone, Copy, ComponentLayout)]
#[repr(C)]
pub struct ApplianceOutput {
    pub id: ID,
    pub energized: IntS,
    pub p: f64,
    pub q: f64,
    pub i: f64,
    pub s: f64,
    pub pf: f64,
}

#[derive(Debug, Clone, Copy, ComponentLayout)]
#[repr(C)]
pub struct NodeOutputAsym {
    pub id: ID,
    pub energized: IntS,
    pub u_pu: RealValueAsym,
    pub u: RealValueAsym,
    pub u_angle: RealValueAsym,
    pub p: RealValueAsym,
    pub q: RealValueAsym,
}

#[derive(Debug, Clone, Copy, ComponentLayout)]
#[repr(C)]
pub struct BranchOutputAsym {
    pub id: ID,
    pub energized: IntS,
    pub loading: f64,
    pub p_from: RealValueAsym,
    pub q_from: RealValueAsym,
    pub i_from: RealValueAsym,
    pub s_from: RealValueAsym,
    pub p_to: RealValueAsym,
    pub q_to: RealValueAsym,
    pub i_to: RealValueAsym,
    pub s_to: RealValueAsym,
}

#[derive(Debug, Clone, Copy, ComponentLayout)]
#[repr(C)]
pub struct ApplianceOutputAsym {
    pub id: ID,
    pub energized: IntS,
    pub p: RealValueAsym,
    pub q: RealValueAsym,
    pub i: RealValueAsym,
    pub s: RealValueAsym,
    pub pf: RealValueAsym,
}

#[derive(Debug, Clone, Copy, ComponentLayout)]
#[repr(C)]
pub struct NodeShortCircuitOutput {
    pub id: ID,
    pub energized: IntS,
    pub u_pu: f64,
    pub u: f64,
    pub u_angle: f64,
}

#[derive(Debug, Clone, Copy, ComponentLayout)]
#[repr(C)]
pub struct BranchShortCircuitOutput {
    pub id: ID,
    pub energized: IntS,
    pub i_from: f64,
    pub i_from_angle: f64,
    pub i_to: f64,
    pub i_to_angle: f64,
}

#[derive(Debug, Clone, Copy, ComponentLayout)]
#[repr(C)]
pub struct ApplianceShortCircuitOutput {
    pub id: ID,
    pub energized: IntS,
    pub i: f64,
    pub i_angle: f64,
}

pub(super) fn build_meta_data() -> MetaData {
    MetaData {
        datasets: vec![
            MetaDataset::new(
                INPUT,
                vec![
                    NodeInput::meta("node"),
                    LineInput::meta("line"),
                    SourceInput::meta("source"),
                    SymLoadInput::meta("sym_load"),
                    AsymLoadInput::meta("asym_load"),
                    ShuntInput::meta("shunt"),
                ],
            ),
            MetaDataset::new(
                UPDATE,
                vec![
                    LineUpdate::meta("line"),
                    SourceUpdate::meta("source"),
                    SymLoadUpdate::meta("sym_load"),
                    AsymLoadUpdate::meta("asym_load"),
                    ShuntUpdate::meta("shunt"),
                ],
            ),
            MetaDataset::new(
                SYM_OUTPUT,
                vec![
                    NodeOutput::meta("node"),
                    BranchOutput::meta("line"),
                    ApplianceOutput::meta("source"),
                    ApplianceOutput::meta("sym_load"),
                    ApplianceOutput::meta("asym_load"),
                    ApplianceOutput::meta("shunt"),
                ],
            ),
            MetaDataset::new(
                ASYM_OUTPUT,
                vec![
                    NodeOutputAsym::meta("node"),
                    BranchOutputAsym::meta("line"),
                    ApplianceOutputAsym::meta("source"),
                    ApplianceOutputAsym::meta("sym_load"),
                    ApplianceOutputAsym::meta("asym_load"),
                    ApplianceOutputAsym::meta("shunt"),
                ],
            ),
            MetaDataset::new(
                SC_OUTPUT,
                vec![
                    NodeShortCircuitOutput::meta("node"),
                    BranchShortCircuitOutput::meta("line"),
                    ApplianceShortCircuitOutput::meta("source"),
                    ApplianceShortCircuitOutput::meta("sym_load"),
                    ApplianceShortCircuitOutput::meta("asym_load"),
                    ApplianceShortCircuitOutput::meta("shunt"),
                ],
            ),
        ],
    }
}
