//! Request and result data model shared by every stage of the pipeline.

mod request;
mod result;

pub use request::{ConversionOptions, ConversionRequest, RequestContent, RequestType};
pub use result::{ConversionResult, ImageAsset, PageResult, error_note_body};
