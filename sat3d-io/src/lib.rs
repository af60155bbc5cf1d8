
//! Camera-file codecs and external-toolkit data exchange

pub mod adjustment;
pub mod error;
pub mod geotiff;
pub mod registry;
pub mod rpb;
pub mod rpc_text;
pub mod tsai;
pub mod xml;

pub use adjustment::{
    apply_adjustment, fit_affine_correction, read_adjustment, read_residuals, Adjustment,
    ImageResidual,
};
pub use error::{CodecError, Result};
pub use geotiff::{read_rpc_geotiff, SceneMetadata};
pub use registry::DistortionRegistry;
pub use rpb::read_rpb;
pub use rpc_text::{read_rpc_text, write_rpc_text};
pub use tsai::{read_pinhole, write_pinhole};
pub use xml::read_rpc_xml;

// Re-export from sat3d-core for convenience
pub use sat3d_core::{RpcCoefficients, RpcModel};
