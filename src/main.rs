use std::fs;
use std::io::{self, Read};

use anyhow::{anyhow, Context as _};
use clap::{App, Arg};
use inkwell::context::Context;
use inkwell::execution_engine::JitFunction;
use inkwell::support::LLVMString;
use inkwell::values::AnyValue;
use inkwell::OptimizationLevel;

use kaleidoscope_jit::ast::ASTNode;
use kaleidoscope_jit::codegen::Codegen;
use kaleidoscope_jit::lexer::{Lexer, Token};
use kaleidoscope_jit::parser::{Parser, ParserError, ANONYMOUS_FUNCTION_NAME};

type EntryFunc = unsafe extern "C" fn() -> f64;

fn main() -> anyhow::Result<()> {
    let matches = App::new("kaleidoscope-jit")
        .version(env!("CARGO_PKG_VERSION"))
        .about("jit compiler for the kaleidoscope language")
        .arg(
            Arg::with_name("INPUT")
                .help("source file to compile and run; omit it for a repl on stdin")
                .index(1),
        )
        .arg(
            Arg::with_name("source")
                .short("s")
                .long("source")
                .value_name("TEXT")
                .help("compile source text given directly on the command line")
                .takes_value(true)
                .conflicts_with("INPUT"),
        )
        .arg(
            Arg::with_name("quiet")
                .short("q")
                .long("quiet")
                .help("print only the result, not the module ir"),
        )
        .get_matches();

    let quiet = matches.is_present("quiet");

    if let Some(source) = matches.value_of("source") {
        run_source(source, quiet)
    } else if let Some(path) = matches.value_of("INPUT") {
        let source =
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?;
        run_source(&source, quiet)
    } else {
        run_repl()
    }
}

/// Batch mode: parse and lower the whole source, dump the module, then
/// jit the anonymous function if the source had a top-level expression.
/// Each top-level expression replaces the last one's body, so the final
/// one is the one that runs.
fn run_source(source: &str, quiet: bool) -> anyhow::Result<()> {
    let mut parser = Parser::from_source(source);
    let ast = parser.parse_program()?;

    let context = Context::create();
    let mut codegen = Codegen::new(&context);

    let mut has_entry = false;
    for node in &ast {
        match node {
            ASTNode::Extern(proto) => {
                codegen.compile_proto(proto)?;
            }
            ASTNode::Function(function) => {
                codegen.compile_fn(function)?;
                if function.prototype.name == ANONYMOUS_FUNCTION_NAME {
                    has_entry = true;
                }
            }
        }
    }

    if !quiet {
        println!("IR:");
        println!("{}", codegen.module.print_to_string().to_str()?);
    }

    if !has_entry {
        return Ok(());
    }

    let ee = codegen
        .module
        .create_jit_execution_engine(OptimizationLevel::None)
        .map_err(|e| anyhow!("failed to create execution engine: {:?}", e))?;

    let entry: JitFunction<EntryFunc> = unsafe { ee.get_function(ANONYMOUS_FUNCTION_NAME) }?;

    if !quiet {
        println!("Result:");
    }
    unsafe {
        println!("{}", entry.call());
    }

    Ok(())
}

/// Interactive mode: lower each construct as soon as it parses and print
/// its ir, the way the language's tutorial drivers do. Statuses, errors,
/// and per-construct ir go to stderr so stdout carries only the final
/// module dump.
fn run_repl() -> anyhow::Result<()> {
    eprint!("ready> ");
    let chars = io::stdin()
        .lock()
        .bytes()
        .map_while(|b| b.ok())
        .map(char::from);
    let mut parser = Parser::new(Lexer::new(chars));

    let context = Context::create();
    let mut codegen = Codegen::new(&context);

    loop {
        eprint!("ready> ");
        match parser.current() {
            Token::Eof => break,
            // ignore top-level semicolons
            Token::Char(';') => parser.advance(),
            Token::Def => handle_definition(&mut parser, &mut codegen),
            Token::Extern => handle_extern(&mut parser, &mut codegen),
            _ => handle_top_level_expr(&mut parser, &mut codegen),
        }
    }
    eprintln!();

    println!("{}", codegen.module.print_to_string().to_str()?);
    Ok(())
}

fn handle_definition<I: Iterator<Item = char>>(parser: &mut Parser<I>, codegen: &mut Codegen) {
    let function = match parser.parse_definition() {
        Ok(function) => function,
        Err(err) => return recover(parser, err),
    };
    match codegen.compile_fn(&function) {
        Ok(compiled) => {
            eprintln!("Parsed a function definition.");
            dump_stderr(compiled.print_to_string());
        }
        Err(err) => eprintln!("Error: {}", err),
    }
}

fn handle_extern<I: Iterator<Item = char>>(parser: &mut Parser<I>, codegen: &mut Codegen) {
    let proto = match parser.parse_extern() {
        Ok(proto) => proto,
        Err(err) => return recover(parser, err),
    };
    match codegen.compile_proto(&proto) {
        Ok(compiled) => {
            eprintln!("Parsed an extern.");
            dump_stderr(compiled.print_to_string());
        }
        Err(err) => eprintln!("Error: {}", err),
    }
}

fn handle_top_level_expr<I: Iterator<Item = char>>(parser: &mut Parser<I>, codegen: &mut Codegen) {
    let function = match parser.parse_top_level_expr() {
        Ok(function) => function,
        Err(err) => return recover(parser, err),
    };
    match codegen.compile_fn(&function) {
        Ok(compiled) => {
            eprintln!("Parsed a top-level expr.");
            dump_stderr(compiled.print_to_string());
            // free the anonymous function so the name can be used again
            unsafe { compiled.delete() };
        }
        Err(err) => eprintln!("Error: {}", err),
    }
}

/// Report a parse error, then skip one token so the next loop iteration
/// starts from fresh input instead of tripping over the same token.
fn recover<I: Iterator<Item = char>>(parser: &mut Parser<I>, err: ParserError) {
    eprintln!("Error: {}", err);
    parser.advance();
}

fn dump_stderr(ir: LLVMString) {
    // llvm ir is ascii
    match ir.to_str() {
        Ok(text) => eprintln!("{}", text),
        Err(err) => eprintln!("Error: {}", err),
    }
}
