pub mod gfx;
pub mod render_graph;
