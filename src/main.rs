//! `wasmhost` command line driver
//!
//! Walks the usual embedding sequence: initialise the runtime, resolve and
//! load a module, instantiate it, create an execution context, look up an
//! export and call it. Any failure prints a message and exits with status 1.
//!
//! With `--wasi` the module is linked against the preview1 imports and
//! `_start` is called unless `--invoke` names another export. A guest that
//! calls `proc_exit` sets the exit status.

use clap::Parser;
use log::{debug, LevelFilter};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use wasmhost::runtime::wasi::{self, WasiContext};
use wasmhost::runtime::{AllocatorConfig, ContextHandle, InstanceHandle};
use wasmhost::{FsModuleSource, ModuleHandle, NativeImports, Runtime, RuntimeConfig, Value};

#[derive(Parser, Debug)]
#[command(name = "wasmhost", version, about = "Load a WebAssembly module and call its exports")]
struct Args {
    /// Path to a .wasm file, or a module name looked up in --search-path
    module: String,

    /// Exported function to call; without it the exports are listed
    #[arg(long, value_name = "NAME")]
    invoke: Option<String>,

    /// Argument as `type:value`, e.g. `i32:5`; repeat for more arguments
    #[arg(long = "arg", value_name = "TYPE:VALUE")]
    args: Vec<Value>,

    /// Stack size in bytes for the instance and its execution context
    #[arg(long, default_value_t = 8192)]
    stack_size: usize,

    /// Linear memory budget in bytes
    #[arg(long, default_value_t = 65536)]
    heap_size: usize,

    /// Use a pool allocator of this many bytes instead of the system allocator
    #[arg(long, value_name = "BYTES")]
    pool_size: Option<usize>,

    /// Directory searched for bare module names
    #[arg(long, default_value = ".")]
    search_path: PathBuf,

    /// Call repeatedly, feeding the i32 result back in, until it reaches N
    #[arg(long, value_name = "N")]
    repeat_while_below: Option<i32>,

    /// JSON file holding a runtime configuration
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print allocator usage as JSON before tearing down
    #[arg(long)]
    memory_usage: bool,

    /// Link the WASI preview1 imports (stdio, args, environ, proc_exit)
    #[arg(long)]
    wasi: bool,

    /// Environment variable for a WASI guest; repeat for more
    #[arg(long = "env", value_name = "KEY=VALUE", requires = "wasi")]
    env: Vec<String>,

    /// Arguments handed to a WASI guest after its own name
    #[arg(last = true, value_name = "GUEST_ARGS")]
    guest_args: Vec<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbosity: u8) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    match verbosity {
        0 => {}
        1 => {
            builder.filter_level(LevelFilter::Debug);
        }
        _ => {
            builder.filter_level(LevelFilter::Trace);
        }
    }
    builder.init();
}

fn runtime_config(args: &Args) -> Result<RuntimeConfig, String> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|e| format!("couldn't read {}: {}", path.display(), e))?;
            serde_json::from_str(&text).map_err(|e| format!("invalid config {}: {}", path.display(), e))?
        }
        None => RuntimeConfig::new(),
    };
    if let Some(capacity) = args.pool_size {
        config = config.with_allocator(AllocatorConfig::Pool { capacity });
    }
    Ok(config)
}

/// The guest's view of its process: argv[0] is the module as named on the command line
fn wasi_context(args: &Args) -> Result<WasiContext, String> {
    let mut builder = WasiContext::builder()
        .args([&args.module])
        .args(&args.guest_args);
    for pair in &args.env {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("--env expects KEY=VALUE, got {pair}"))?;
        builder = builder.env(key, value);
    }
    Ok(builder.build())
}

fn load(runtime: &mut Runtime, args: &Args) -> Result<ModuleHandle, wasmhost::Error> {
    let path = Path::new(&args.module);
    if path.extension().is_some() || path.components().count() > 1 {
        let bytes = fs::read(path).map_err(|e| wasmhost::Error::ModuleSource(format!("{}: {}", path.display(), e)))?;
        runtime.load(&bytes)
    } else {
        runtime.load_named(&FsModuleSource::new(&args.search_path), &args.module)
    }
}

fn call(
    runtime: &mut Runtime,
    instance: InstanceHandle,
    context: ContextHandle,
    name: &str,
    args: &Args,
) -> Result<Vec<Value>, String> {
    let function = runtime
        .lookup(instance, name)
        .map_err(|e| format!("The {name} wasm function is not found. error: {e}"))?;

    let invoke = |runtime: &mut Runtime, arguments: &[Value]| {
        runtime.call(context, &function, arguments).map_err(|err| {
            let exception = runtime.exception(instance).ok().flatten().map(str::to_string);
            format!("call wasm function {} failed. {}", name, exception.unwrap_or_else(|| err.to_string()))
        })
    };

    let Some(limit) = args.repeat_while_below else {
        return invoke(runtime, &args.args);
    };

    let start = Instant::now();
    let mut results = invoke(runtime, &args.args)?;
    loop {
        let i = match results.first().and_then(Value::as_i32) {
            Some(i) => i,
            None => return Err(format!("{name} must return an i32 to be repeated")),
        };
        if i >= limit {
            break;
        }
        results = invoke(runtime, &[Value::I32(i)])?;
    }
    println!("time: {} ns", start.elapsed().as_nanos());
    Ok(results)
}

fn run(args: &Args) -> Result<ExitCode, String> {
    let config = runtime_config(args)?;
    let mut runtime = Runtime::new(config).map_err(|e| format!("Init runtime environment failed. error: {e}"))?;

    let wasi = if args.wasi {
        Some(Arc::new(wasi_context(args)?))
    } else {
        None
    };
    let imports = match &wasi {
        Some(ctx) => wasi::imports(Arc::clone(ctx)),
        None => NativeImports::new(),
    };

    let module = load(&mut runtime, args).map_err(|e| format!("Load wasm module failed. error: {e}"))?;
    let instance = runtime
        .instantiate_with_imports(module, &imports, args.stack_size, args.heap_size)
        .map_err(|e| format!("Instantiate wasm module failed. error: {e}"))?;
    let context = runtime
        .create_context(instance, args.stack_size)
        .map_err(|e| format!("Create wasm execution environment failed. error: {e}"))?;

    let mut status = ExitCode::SUCCESS;
    let invoke = args.invoke.as_deref().or(args.wasi.then_some("_start"));
    match invoke {
        Some(name) => match call(&mut runtime, instance, context, name, args) {
            Ok(results) => {
                let rendered: Vec<String> = results.iter().map(ToString::to_string).collect();
                println!("ret value: {}", rendered.join(", "));
            }
            Err(message) => match wasi.as_ref().and_then(|ctx| ctx.exit_code()) {
                Some(code) => {
                    debug!("{name} exited with code {code}");
                    status = ExitCode::from(code as u8);
                }
                None => return Err(message),
            },
        },
        None => {
            let exports = runtime.exports(instance).map_err(|e| e.to_string())?;
            for (name, kind) in exports {
                println!("{kind} {name}");
            }
        }
    }

    if args.memory_usage {
        let usage = runtime.memory_usage();
        let json = serde_json::to_string_pretty(&usage).map_err(|e| e.to_string())?;
        println!("{json}");
    }

    runtime.destroy_context(context).map_err(|e| e.to_string())?;
    runtime.deinstantiate(instance).map_err(|e| e.to_string())?;
    runtime.unload(module).map_err(|e| e.to_string())?;
    runtime.destroy();
    debug!("done");
    Ok(status)
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(&args) {
        Ok(status) => status,
        Err(message) => {
            println!("{message}");
            ExitCode::FAILURE
        }
    }
}
