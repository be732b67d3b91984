pub mod cli;
pub mod commands;
pub mod fits;

// Re-export commonly used items
pub use fits::{
    find_data_extension, field_of_view, get_pixscale_from_header, inspect_fits, load_hdus,
    FitsInspection, HduInfo,
};
