pub mod render_loop;
pub mod scene;
pub mod slot;
pub mod surface;
