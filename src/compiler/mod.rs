pub mod ast;
pub mod constfold;
pub mod cps;
pub mod env;
pub mod gensym;
pub mod optimize;
pub mod scope;

use crate::{error::CompileError, options::Options};

use self::{
    ast::Node,
    gensym::NameGen,
    scope::{resolve, Mode},
};

/// Converts a direct-style tree to CPS and, unless disabled, optimizes it.
///
/// The result always carries fresh resolver annotations. The program finishes by
/// calling the function named `options.sink` with its value.
pub fn compile(ast: Node, options: &Options) -> Result<Node, CompileError> {
    let mut names = NameGen::new();
    names.reserve(&options.sink);
    let policy = options.global_policy();

    let mut tree = cps::transform(ast, &mut names, cps::sink(&options.sink))?;
    if options.optimize {
        tree = optimize::optimize(tree, &mut names, &policy)?;
    } else {
        resolve(&mut tree, &policy, Mode::Cps)?;
    }

    Ok(tree)
}
