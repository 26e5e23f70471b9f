use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use itertools::Itertools;
use rayon::prelude::*;
use rootcause::prelude::*;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use grimmodel::data::DirectoryLoader;
use grimmodel::data::wrappers::mmap::MappedFile;
use grimmodel::gpu::merge::merge_vertex_streams;
use grimmodel::gpu::registry::{BufferRegistry, MeshRegistry};
use grimmodel::materials::{MaterialRegistry, parse_material_defs};
use grimmodel::models::model::decode_model;
use grimmodel::scene::{SceneDef, load_scene_resources};

/// Inspect MDL1 model files and dry-run scene loading
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode model files and print their nodes and meshes
    Inspect {
        /// .model files, or directories to scan for them
        paths: Vec<PathBuf>,
    },
    /// Load every model a scene references into in-memory buffers
    LoadScene {
        /// Directory that model paths in the scene are relative to
        #[clap(short, long)]
        root: PathBuf,

        /// Materials document to register before loading
        #[clap(short, long)]
        materials: Option<PathBuf>,

        /// Scene document
        scene: PathBuf,
    },
}

fn collect_model_paths(inputs: Vec<PathBuf>) -> Result<Vec<PathBuf>, Report> {
    let mut paths = Vec::with_capacity(inputs.len());
    for path in inputs {
        if path.is_dir() {
            for entry in fs::read_dir(&path).context(format!("Failed to read {}", path.display()))? {
                let entry = entry?;
                let is_model = entry.path().extension().is_some_and(|ext| ext == "model");
                if entry.file_type()?.is_file() && is_model {
                    paths.push(entry.path());
                }
            }
        } else {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn summarize_model(path: &Path) -> Result<String, Report> {
    let file = MappedFile::open(path).context(format!("Failed to open {}", path.display()))?;
    let model = decode_model(&file).context(format!("Failed to decode {}", path.display()))?;

    let mut out = String::new();
    writeln!(
        out,
        "{}: {} nodes, {} meshes, {} bytes",
        path.display(),
        model.nodes.len(),
        model.meshes.len(),
        model.consumed
    )?;

    for node in &model.nodes {
        let Some(entity) = node.mesh.and_then(|index| model.meshes.get(index)) else {
            continue;
        };
        let mesh = &entity.mesh;
        let merged = match merge_vertex_streams(mesh) {
            Ok(vertices) => format!("{} packed", vertices.len()),
            Err(e) => format!("not mergeable: {e}"),
        };
        writeln!(
            out,
            "  {}: {} vertices ({merged}), {} indices, {} bones, streams [{}]",
            node.name,
            mesh.num_vertices,
            mesh.num_indices,
            entity.bones.len(),
            mesh.present_slots().join(", ")
        )?;
        for submesh in &mesh.submeshes {
            writeln!(
                out,
                "    {} @ {} +{}",
                submesh.material_name, submesh.indices_start, submesh.indices_count
            )?;
        }
    }
    Ok(out)
}

fn inspect(paths: Vec<PathBuf>) -> Result<(), Report> {
    let paths = collect_model_paths(paths)?;
    let summaries: Vec<_> = paths.par_iter().map(|path| summarize_model(path)).collect();

    let mut failed = 0usize;
    for (path, summary) in paths.iter().zip(summaries) {
        match summary {
            Ok(summary) => print!("{summary}"),
            Err(e) => {
                error!(path = %path.display(), "{e}");
                failed += 1;
            }
        }
    }

    info!(files = paths.len(), failed, "inspected model files");
    if failed > 0 {
        Err::<(), _>(std::io::Error::other(format!(
            "{failed} of {} files failed to decode",
            paths.len()
        )))
        .context("Inspection failed")?;
    }
    Ok(())
}

fn load_scene(root: PathBuf, materials: Option<PathBuf>, scene: PathBuf) -> Result<(), Report> {
    let scene_json = fs::read_to_string(&scene).context(format!("Failed to read {}", scene.display()))?;
    let scene_def = SceneDef::from_json(&scene_json).context("Failed to parse scene")?;

    let mut material_registry = MaterialRegistry::new();
    if let Some(materials) = materials {
        let json = fs::read_to_string(&materials)
            .context(format!("Failed to read {}", materials.display()))?;
        let defs = parse_material_defs(&json).context("Failed to parse materials")?;
        material_registry.add_materials(defs);
    }

    let loader = DirectoryLoader::new(&root);
    let mut buffers = BufferRegistry::new();
    let mut meshes = MeshRegistry::new();
    let resources = load_scene_resources(
        &scene_def,
        &loader,
        &mut buffers,
        &material_registry,
        &mut meshes,
    )?;

    println!(
        "{} entities, {} instances: {} meshes, {} render objects, {} materials, {} buffer bytes",
        scene_def.entities.len(),
        scene_def.instances.len(),
        meshes.len(),
        resources.render_objects.len(),
        material_registry.len(),
        buffers.total_bytes()
    );
    if !resources.failed_entities.is_empty() {
        println!("failed: {}", resources.failed_entities.iter().join(", "));
    }
    Ok(())
}

fn main() -> Result<(), Report> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    match args.command {
        Command::Inspect { paths } => inspect(paths),
        Command::LoadScene {
            root,
            materials,
            scene,
        } => load_scene(root, materials, scene),
    }
}
