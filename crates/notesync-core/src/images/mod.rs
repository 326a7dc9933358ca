//! Image references embedded in note bodies and the files behind them.

mod codec;
mod materializer;
mod resolver;

pub use codec::{DeltaCodec, RichTextCodec};
pub use materializer::{
    cloud_object_path, generated_image_name, ImageLocation, ImageMaterializer, MigrationDirection,
    IMAGE_NAME_PREFIX,
};
pub use resolver::{local_path, ImageKind, ImageRef, ImageResolver};
