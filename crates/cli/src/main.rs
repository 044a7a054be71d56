#![deny(unsafe_code)]
//! CLI binary for the shaderlab shader pipeline.
//!
//! Subcommands:
//! - `builtins` -- print the built-in uniform and mesh attribute catalogue
//! - `inspect <pack>` -- scan a shader pack and report its declarations
//! - `order <scene>` -- resolve the draw order of a scene document

mod error;

use clap::{Parser, Subcommand};
use error::CliError;
use serde_json::{json, Value};
use shaderlab_core::builtins::MESH_ATTRIBUTES;
use shaderlab_core::draw_order::{self, ResolvedOrder};
use shaderlab_core::{
    BuiltInRegistry, ComponentDocument, DrawNode, OutputKey, ProgramModel, RecycleBin,
    SceneDocument, ShaderComponent, ShaderPack,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "shaderlab", about = "Shader pipeline inspection CLI")]
struct Cli {
    /// Output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the built-in uniforms and mesh attributes.
    Builtins,
    /// Scan a shader pack and report per-stage declarations.
    Inspect {
        /// Shader pack file with `[vertex shader]`-style section headers.
        pack: PathBuf,
    },
    /// Resolve the draw order of a scene document.
    Order {
        /// Scene JSON with component documents and sampler inputs.
        scene: PathBuf,
    },
}

fn builtins_report(registry: &BuiltInRegistry) -> Value {
    let uniforms: Vec<Value> = registry
        .entries()
        .iter()
        .map(|b| {
            json!({
                "name": b.name,
                "type": b.type_tag,
                "description": b.description,
            })
        })
        .collect();
    json!({
        "uniforms": uniforms,
        "attributes": MESH_ATTRIBUTES,
    })
}

fn inspect_report(pack: &ShaderPack, registry: &BuiltInRegistry) -> Value {
    let mut program = ProgramModel::new();
    let mut bin = RecycleBin::new();
    pack.apply(&mut program, &mut bin);

    let stages: Vec<Value> = program
        .stages()
        .filter(|stage| !stage.is_empty())
        .map(|stage| {
            let uniforms: Vec<Value> = stage
                .uniforms()
                .iter()
                .map(|u| {
                    json!({
                        "name": u.name,
                        "type": u.type_tag,
                        "array_length": u.array_length,
                        "built_in": registry.is_reserved(&u.name),
                    })
                })
                .collect();
            let attributes: Vec<Value> = stage
                .attributes()
                .iter()
                .map(|a| {
                    json!({
                        "name": a.name,
                        "type": a.type_tag,
                        "location": a.location,
                        "built_in": MESH_ATTRIBUTES.iter().any(|m| m.name == a.name),
                    })
                })
                .collect();
            json!({
                "stage": stage.kind(),
                "title": stage.kind().title(),
                "uniforms": uniforms,
                "attributes": attributes,
            })
        })
        .collect();

    json!({
        "link_eligible": program.is_link_eligible(),
        "stages": stages,
    })
}

/// Builds the component a scene entry describes. A missing document means
/// the default component.
fn scene_component(id: &str, document: &Value) -> Result<ShaderComponent, CliError> {
    if document.is_null() {
        return Ok(ShaderComponent::new(id));
    }
    Ok(ComponentDocument::from_value(document)?.to_component(id))
}

/// One draw node per scene component. Only declared sampler uniforms whose
/// input names another component's output count as dependencies.
fn scene_nodes(scene: &SceneDocument) -> Result<Vec<DrawNode>, CliError> {
    let mut seen = HashSet::new();
    let mut nodes = Vec::with_capacity(scene.components.len());
    for entry in &scene.components {
        let component = scene_component(&entry.id, &entry.document)?;
        if !seen.insert(component.id().clone()) {
            return Err(CliError::Scene(format!(
                "scene lists component '{}' twice",
                component.id()
            )));
        }
        let mut node = DrawNode::new(component.id().clone(), component.sort_order());
        for (name, text) in &entry.samplers {
            let declared = component
                .program()
                .uniform_type(name)
                .is_some_and(|u| u.type_tag.starts_with("sampler"));
            if !declared {
                log::debug!("{}: ignoring undeclared sampler {name}", component.id());
                continue;
            }
            if let Ok(key) = text.parse::<OutputKey>() {
                node = node.consuming(key.component.as_str());
            }
        }
        nodes.push(node);
    }
    Ok(nodes)
}

fn order_report(resolved: &ResolvedOrder) -> Value {
    let order: Vec<&str> = resolved.order.iter().map(|id| id.as_str()).collect();
    let cycle = resolved
        .cycle
        .as_ref()
        .map(|(a, b)| vec![a.as_str(), b.as_str()]);
    json!({
        "order": order,
        "cycle": cycle,
    })
}

fn load_pack(path: &Path) -> Result<ShaderPack, CliError> {
    ShaderPack::load(path).map_err(|e| CliError::at(path, e))
}

fn load_scene(path: &Path) -> Result<SceneDocument, CliError> {
    SceneDocument::load(path).map_err(|e| CliError::at(path, e))
}

fn run(cli: Cli) -> Result<(), CliError> {
    let registry = BuiltInRegistry::standard();
    match cli.command {
        Command::Builtins => {
            let report = builtins_report(&registry);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Uniforms:");
                for b in registry.entries() {
                    println!("  {:<28} {:<10} {}", b.name, b.type_tag, b.description);
                }
                println!("Attributes:");
                for a in MESH_ATTRIBUTES {
                    println!("  {:<28} {:<10} {}", a.name, a.type_tag, a.description);
                }
            }
        }
        Command::Inspect { pack } => {
            let report = inspect_report(&load_pack(&pack)?, &registry);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_inspect(&report);
            }
        }
        Command::Order { scene } => {
            let scene = load_scene(&scene)?;
            let resolved = draw_order::resolve(&scene_nodes(&scene)?);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&order_report(&resolved))?);
            } else {
                for (position, id) in resolved.order.iter().enumerate() {
                    println!("{:>3}. {id}", position + 1);
                }
                if let Some((a, b)) = &resolved.cycle {
                    eprintln!("warning: {a} and {b} sample each other's output");
                }
            }
        }
    }

    Ok(())
}

fn print_inspect(report: &Value) {
    let empty = Vec::new();
    for stage in report["stages"].as_array().unwrap_or(&empty) {
        println!("{} shader", stage["title"].as_str().unwrap_or("?"));
        for (label, key) in [("uniform", "uniforms"), ("attribute", "attributes")] {
            for decl in stage[key].as_array().unwrap_or(&empty) {
                let marker = if decl["built_in"].as_bool() == Some(true) {
                    " (built-in)"
                } else {
                    ""
                };
                println!(
                    "  {label} {} {}{marker}",
                    decl["type"].as_str().unwrap_or("?"),
                    decl["name"].as_str().unwrap_or("?"),
                );
            }
        }
    }
    let eligible = report["link_eligible"].as_bool() == Some(true);
    println!(
        "{}",
        if eligible {
            "link-eligible"
        } else {
            "not link-eligible: vertex and fragment stages are required"
        }
    );
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let json_mode = cli.json;
    if let Err(e) = run(cli) {
        if json_mode {
            let j = json!({"error": e.to_string(), "exit_code": e.exit_code()});
            eprintln!("{}", serde_json::to_string_pretty(&j).unwrap_or_default());
        } else {
            eprintln!("error: {e}");
        }
        process::exit(e.exit_code());
    }
}
