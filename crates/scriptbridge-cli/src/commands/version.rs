use miette::Result;
use scriptbridge_core::version::version_string;
use scriptbridge_core::VERSION;
use serde::Serialize;

#[derive(Serialize)]
struct VersionResult {
    ok: bool,
    name: &'static str,
    version: &'static str,
}

pub fn run(json: bool) -> Result<()> {
    if json {
        return super::print_json(&VersionResult {
            ok: true,
            name: "scriptbridge",
            version: VERSION,
        });
    }
    println!("{}", version_string());
    Ok(())
}
