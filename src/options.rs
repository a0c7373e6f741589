use crate::compiler::scope::GlobalPolicy;

pub const DEFAULT_BUDGET: usize = 200;
pub const DEFAULT_SINK: &str = "β_TOPLEVEL";

pub struct Options {
    /// Run the fixed-point optimizer after CPS conversion.
    pub optimize: bool,
    /// Guarded calls allowed per trampoline cycle.
    pub budget: usize,
    /// Name of the top-level continuation.
    pub sink: String,
    /// Reject references to globals that are not listed in `globals`.
    pub strict: bool,
    pub globals: Vec<String>,
    pub dump: bool,
    pub program: Option<String>,
    pub list: bool,
    pub help: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}

impl Options {
    pub fn new() -> Self {
        Options {
            optimize: true,
            budget: DEFAULT_BUDGET,
            sink: DEFAULT_SINK.to_owned(),
            strict: false,
            globals: vec!["print".to_owned(), "println".to_owned()],
            dump: false,
            program: None,
            list: false,
            help: false,
        }
    }

    pub fn set_optimize(&mut self, optimize: bool) {
        self.optimize = optimize;
    }

    pub fn set_budget(&mut self, budget: usize) {
        self.budget = budget;
    }

    pub fn set_sink(&mut self, sink: &str) {
        self.sink = sink.to_owned();
    }

    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    pub fn declare_global(&mut self, name: &str) {
        if !self.globals.iter().any(|global| global == name) {
            self.globals.push(name.to_owned());
        }
    }

    /// Free names the resolver accepts. The top-level continuation is always declared.
    pub fn global_policy(&self) -> GlobalPolicy {
        if !self.strict {
            return GlobalPolicy::Open;
        }

        GlobalPolicy::declared(
            self.globals
                .iter()
                .cloned()
                .chain(std::iter::once(self.sink.clone())),
        )
    }

    pub fn parse() -> Result<Self, String> {
        parse(pico_args::Arguments::from_env())
    }
}

pub const USAGE: &str = "\
Usage: cps-demo [options] [program]
Options:
  -h, --help: Print this help message
  --list: List the bundled programs
  --no-optimize: Skip the optimizer and run the raw CPS tree
  --budget <n>: Guarded calls per trampoline cycle (default: 200)
  --sink <name>: Name of the top-level continuation
  --strict: Only allow declared globals
  --global <name>: Declare a global (repeatable)
  --dump: Print the compiled tree before running it";

pub fn parse(mut args: pico_args::Arguments) -> Result<Options, String> {
    let mut options = Options::new();

    if args.contains(["-h", "--help"]) {
        options.help = true;
        return Ok(options);
    }

    let budget = match args.opt_value_from_str::<_, usize>("--budget") {
        Ok(Some(budget)) => budget,
        Ok(None) => DEFAULT_BUDGET,
        Err(e) => return Err(e.to_string()),
    };

    let sink = match args.opt_value_from_str::<_, String>("--sink") {
        Ok(Some(sink)) => sink,
        Ok(None) => DEFAULT_SINK.to_owned(),
        Err(e) => return Err(e.to_string()),
    };

    let globals = match args.values_from_str::<_, String>("--global") {
        Ok(globals) => globals,
        Err(e) => return Err(e.to_string()),
    };

    options.set_optimize(!args.contains("--no-optimize"));
    options.set_strict(args.contains("--strict"));
    options.set_budget(budget);
    options.set_sink(&sink);
    for global in &globals {
        options.declare_global(global);
    }
    options.dump = args.contains("--dump");
    options.list = args.contains("--list");

    options.program = match args.opt_free_from_str::<String>() {
        Ok(program) => program,
        Err(e) => return Err(e.to_string()),
    };

    let rest = args.finish();
    if !rest.is_empty() {
        return Err(format!("unexpected arguments: {:?}", rest));
    }

    Ok(options)
}
