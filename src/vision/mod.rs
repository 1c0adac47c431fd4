// Vision module for image translation

pub mod models;
pub mod translation;

pub use translation::translate_image_source;
