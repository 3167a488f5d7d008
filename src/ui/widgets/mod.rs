mod surface_view;

pub use surface_view::SurfaceView;
