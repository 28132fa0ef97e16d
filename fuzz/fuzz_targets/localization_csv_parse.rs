//! Fuzz target for localization CSV parsing.
//!
//! Parses arbitrary UTF-8 as a table, then reads every cell as a frame number
//! and a coordinate the way the upload path does.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tatorsync::table::{infer_value, Table};

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let Ok(csv) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(table) = Table::from_csv_str(csv) else {
        return;
    };

    for row in 0..table.len() {
        for col in 0..table.headers().len() {
            let _ = table.u64_at(row, col);
            let _ = table.f64_at(row, col);
            let _ = infer_value(table.cell(row, col));
        }
    }
});
