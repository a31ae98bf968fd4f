mod color;
pub use color::ColorTable;

mod combined;
pub use combined::CombinedLightCurve;

mod light_curve;
pub use light_curve::{LightCurveTable, Observation};

mod multi_image;
pub use multi_image::MultiImageLightCurve;
