/// Prompt Document Tracer - Shows the flow through Source → AST → Printed source
///
/// Usage: cargo run --bin trace_parser <prompt-file>
///
/// Set `RUST_LOG=quill_dsl=debug` to see parser events.
use quill_dsl::{parse_with_diagnostics, pretty_print, Node};
use std::fs;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: cargo run --bin trace_parser <prompt-file>");
        eprintln!();
        eprintln!("Example:");
        eprintln!("  cargo run --bin trace_parser prompts/main.prompt");
        std::process::exit(1);
    }

    let path = &args[1];

    println!("╔═══════════════════════════════════════════════════════════════");
    println!("║ PROMPT DOCUMENT TRACER");
    println!("╚═══════════════════════════════════════════════════════════════\n");

    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("❌ Failed to read {}: {}", path, e);
            std::process::exit(1);
        }
    };

    println!("📝 INPUT:");
    println!("{}", content);
    println!();

    let (document, errors) = parse_with_diagnostics(&content);

    println!("🔑 DIGEST: {}", document.digest);
    println!();

    if let Some(config) = document.config() {
        println!("⚙️  CONFIG:");
        match serde_json::to_string_pretty(&config.value) {
            Ok(json) => println!("{}", json),
            Err(e) => println!("<unprintable: {}>", e),
        }
        println!();
    }

    println!("🌳 NODES:");
    for node in &document.nodes {
        print_node(node, 1);
    }
    println!();

    if errors.is_empty() {
        println!("✅ No parse errors");
        println!();
        println!("🖨️  PRETTY PRINTED:");
        println!("{}", pretty_print(&document));
    } else {
        println!("❌ {} PARSE ERROR(S):", errors.len());
        for error in &errors {
            println!("   {}", error);
        }
        std::process::exit(2);
    }
}

fn print_node(node: &Node, depth: usize) {
    let indent = "  ".repeat(depth);
    let span = node.span();
    match node {
        Node::Config(_) => println!("{}Config @{}:{}", indent, span.line, span.column),
        Node::Text { value, .. } => {
            println!("{}Text {:?} @{}:{}", indent, value, span.line, span.column)
        }
        Node::Expression { expression, .. } => println!(
            "{}Expression {{{{ {} }}}} @{}:{}",
            indent,
            quill_dsl::print_expression(expression),
            span.line,
            span.column
        ),
        Node::If(block) => {
            println!("{}If @{}:{}", indent, span.line, span.column);
            for branch in &block.branches {
                println!(
                    "{}  when {}",
                    indent,
                    quill_dsl::print_expression(&branch.test)
                );
                for child in &branch.children {
                    print_node(child, depth + 2);
                }
            }
            if let Some(alternate) = &block.alternate {
                println!("{}  else", indent);
                for child in alternate {
                    print_node(child, depth + 2);
                }
            }
        }
        Node::Each(block) => {
            println!(
                "{}Each {} as {} @{}:{}",
                indent,
                quill_dsl::print_expression(&block.iterable),
                block.item,
                span.line,
                span.column
            );
            for child in &block.body {
                print_node(child, depth + 1);
            }
        }
        Node::Element(element) => {
            let attributes: Vec<&str> =
                element.attributes.iter().map(|a| a.name.as_str()).collect();
            println!(
                "{}<{}> {:?} @{}:{}",
                indent, element.name, attributes, span.line, span.column
            );
            for child in &element.children {
                print_node(child, depth + 1);
            }
        }
        Node::Fence(fence) => println!(
            "{}Fence {:?} ({} bytes) @{}:{}",
            indent,
            fence.info,
            fence.body.len(),
            span.line,
            span.column
        ),
    }
}
