//! Build script for odbckit-db.
//!
//! With the `native` feature the crate links the platform ODBC driver
//! manager. Most systems ship it on the default linker path; for
//! self-built unixODBC installs point `ODBCKIT_ODBC_LIB_DIR` at the
//! directory holding `libodbc`.

const LIB_DIR_VAR: &str = "ODBCKIT_ODBC_LIB_DIR";

fn main() {
    println!("cargo:rerun-if-env-changed={LIB_DIR_VAR}");

    if std::env::var_os("CARGO_FEATURE_NATIVE").is_none() {
        return;
    }

    if let Some(dir) = std::env::var_os(LIB_DIR_VAR) {
        println!("cargo:rustc-link-search=native={}", dir.to_string_lossy());
    }
}
