use std::error::Error;

use vergen::{BuildBuilder, Emitter, RustcBuilder};
use vergen_git2::Git2Builder;

fn main() -> Result<(), Box<dyn Error>> {
    let build = BuildBuilder::all_build()?;
    let rustc = RustcBuilder::all_rustc()?;

    Emitter::default()
        .add_instructions(&build)?
        .add_instructions(&rustc)?
        .emit()?;

    let git = Git2Builder::all_git()?;

    vergen_git2::Emitter::default()
        .add_instructions(&git)?
        .emit()?;

    Ok(())
}
