pub mod inspect;
pub mod pixscale;

pub use inspect::inspect;
pub use pixscale::pixscale;
