//! Box geometry shared by the CSV, YOLO and server representations.
//!
//! Localizations on the server and in CSV files are boxes normalized to the
//! frame size with the origin at the top-left corner. YOLO labels use the box
//! center instead.

mod bbox;

pub use bbox::{round_to, BBox, COORD_DECIMALS};
