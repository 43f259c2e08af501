pub mod studio;

pub use studio::Studio;
