//! molray CLI - Build, inspect, query and export scene BVHs.

use anyhow::{bail, Context, Result};
use molray::bvh::TextureLayout;
use molray::prelude::*;
use serde::Serialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut level = "info";
    let mut settings_path: Option<PathBuf> = None;
    let mut brute = false;
    let mut filtered_args: Vec<&str> = Vec::new();
    let mut iter = args[1..].iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-v" | "--verbose" => level = "debug",
            "-vv" | "--trace" => level = "trace",
            "-q" | "--quiet" => level = "error",
            "--brute" => brute = true,
            "--settings" => match iter.next() {
                Some(path) => settings_path = Some(PathBuf::from(path)),
                None => {
                    eprintln!("Error: --settings needs a file argument");
                    std::process::exit(1);
                }
            },
            "-V" | "--version" => {
                println!(
                    "molray {} (built {} {})",
                    env!("CARGO_PKG_VERSION"),
                    env!("MOLRAY_BUILD_DATE"),
                    env!("MOLRAY_BUILD_TIME")
                );
                return;
            }
            _ => filtered_args.push(arg),
        }
    }

    if filtered_args.is_empty() {
        print_help();
        return;
    }

    #[allow(clippy::let_unit_value)]
    let _trace_guard = init_tracing(level);

    let mut settings = match &settings_path {
        Some(path) => Settings::load_or_default(path),
        None => Settings::default(),
    };
    settings.apply_env();
    if brute {
        settings.traversal = TraversalMode::BruteForce;
    }

    let result = match filtered_args[0] {
        // Stats command - build and summarize
        "stats" | "s" => {
            if filtered_args.len() < 2 {
                usage("molray stats <scene.json>");
            }
            cmd_stats(filtered_args[1], settings)
        }

        // Pick command - closest hit of one ray
        "pick" | "p" => {
            if filtered_args.len() < 8 {
                usage("molray pick <scene.json> <ox> <oy> <oz> <dx> <dy> <dz> [--brute]");
            }
            cmd_pick(filtered_args[1], &filtered_args[2..8], settings)
        }

        // Export command - write texture buffers
        "export" | "e" => {
            if filtered_args.len() < 3 {
                usage("molray export <scene.json> <out-dir>");
            }
            cmd_export(filtered_args[1], filtered_args[2], settings)
        }

        // Settings command - write the effective settings
        "settings" => {
            if filtered_args.len() < 2 {
                usage("molray settings <out.json>");
            }
            settings
                .save(filtered_args[1])
                .with_context(|| format!("writing {}", filtered_args[1]))
        }

        // Help
        "help" | "h" | "-h" | "--help" => {
            print_help();
            Ok(())
        }

        _ => {
            eprintln!("Unknown command: {}", filtered_args[0]);
            eprintln!();
            print_help();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn usage(text: &str) -> ! {
    eprintln!("Error: missing arguments");
    eprintln!("Usage: {}", text);
    std::process::exit(1);
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("molray={}", level)))
}

/// Log to stderr; with `MOLRAY_TRACE=1` also write a chrome://tracing profile.
#[cfg(feature = "chrome-trace")]
fn init_tracing(level: &str) -> Option<tracing_chrome::FlushGuard> {
    let registry = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false));

    if env::var("MOLRAY_TRACE").ok().as_deref() != Some("1") {
        let _ = registry.try_init();
        return None;
    }

    let (chrome_layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
        .file("trace.json")
        .build();
    registry.with(chrome_layer).try_init().ok().map(|_| guard)
}

/// Log to stderr.
#[cfg(not(feature = "chrome-trace"))]
fn init_tracing(level: &str) {
    let _ = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

fn print_help() {
    println!("molray - molecular scene BVH toolkit");
    println!();
    println!("USAGE:");
    println!("    molray [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    s, stats  <scene>                     Build the BVH, print tree stats and texture layouts");
    println!("    p, pick   <scene> ox oy oz dx dy dz   Closest hit of one ray");
    println!("    e, export <scene> <dir>               Write texture buffers and layout.json");
    println!("    settings  <file>                      Write the effective settings as JSON");
    println!("    h, help                               Show this help");
    println!();
    println!("OPTIONS:");
    println!("    -v, --verbose        Show debug output");
    println!("    -vv, --trace         Show trace output (very verbose)");
    println!("    -q, --quiet          Errors only");
    println!("    --settings <file>    Load settings JSON (defaults if unreadable)");
    println!("    --brute              Pick by testing every primitive");
    println!("    -V, --version        Show version and build date");
    println!();
    println!("ENVIRONMENT:");
    println!("    MOLRAY_MAX_LEAF_SIZE, MOLRAY_MAX_DEPTH   Override builder limits");
    println!("    RUST_LOG                                 Override log filter");
    println!("    MOLRAY_TRACE=1                           Write trace.json (chrome-trace feature)");
    println!();
    println!("EXAMPLES:");
    println!("    molray stats caffeine.json");
    println!("    molray pick caffeine.json 0 0 -10 0 0 1");
    println!("    molray export caffeine.json out/");
}

fn load_scene(path: &str, settings: Settings) -> Result<Scene> {
    tracing::info!("Loading scene: {}", path);
    let geometry = Geometry::load(path).with_context(|| format!("reading {}", path))?;
    let start = Instant::now();
    let scene = Scene::new(geometry, settings)?;
    tracing::info!("Built BVH in {:.2?}", start.elapsed());
    Ok(scene)
}

fn cmd_stats(path: &str, settings: Settings) -> Result<()> {
    let scene = load_scene(path, settings)?;
    let geometry = scene.geometry();
    let stats = scene.stats()?;

    println!("Scene: {}", path);
    println!(
        "Primitives: {} ({} triangles, {} spheres, {} cylinders)",
        geometry.primitive_count(),
        geometry.triangle_count(),
        geometry.spheres.len(),
        geometry.cylinders.len()
    );
    println!();
    println!("BVH:");
    println!("  Nodes:          {}", stats.nodes);
    println!("  Internal:       {}", stats.internal);
    println!("  Leaves:         {}", stats.leaves);
    println!("  Max depth:      {}", stats.max_depth);
    println!("  Max leaf size:  {}", stats.max_leaf_primitives);
    println!("  Root bounds:    {:?}", scene.bvh().root().bounds());
    println!();

    let data = scene.gpu_data()?;
    println!("Textures:");
    let rows = [
        ("nodes", data.nodes.layout, data.nodes.len),
        ("refs", data.refs.layout, data.refs.len),
        ("triangles", data.triangles.layout, data.triangles.len),
        ("spheres", data.spheres.layout, data.spheres.len),
        ("cylinders", data.cylinders.layout, data.cylinders.len),
    ];
    for (name, layout, len) in rows {
        println!("  {:<10} {:>5} x {:<5} ({} texels)", name, layout.width, layout.height, len);
    }
    Ok(())
}

fn cmd_pick(path: &str, coords: &[&str], settings: Settings) -> Result<()> {
    let values = coords
        .iter()
        .map(|s| s.parse::<f32>().with_context(|| format!("invalid number '{}'", s)))
        .collect::<Result<Vec<f32>>>()?;
    let ray = Ray::new(
        Vec3::new(values[0], values[1], values[2]),
        Vec3::new(values[3], values[4], values[5]),
    );
    if ray.dir == Vec3::ZERO {
        bail!("ray direction must be non-zero");
    }

    let scene = load_scene(path, settings)?;
    let start = Instant::now();
    let hit = scene.pick(&ray, None)?;
    tracing::debug!("Pick took {:.2?}", start.elapsed());

    match hit {
        Some(hit) => {
            let p = hit.point(&ray);
            println!("Hit {} {} at t={:.6}", hit.kind, hit.index, hit.t);
            println!("  Point: ({:.6}, {:.6}, {:.6})", p.x, p.y, p.z);
            match hit.detail {
                HitDetail::Triangle { u, v } => println!("  Barycentric: ({:.6}, {:.6}, {:.6})", 1.0 - u - v, u, v),
                HitDetail::Cylinder(part) => println!("  Part: {:?}", part),
                HitDetail::Sphere => {}
            }
        }
        None => println!("No hit"),
    }
    Ok(())
}

/// Layout sidecar written next to the exported buffers.
#[derive(Serialize)]
struct ExportManifest {
    node_count: u32,
    texels_per_node: usize,
    nodes: TextureLayout,
    refs: TextureLayout,
    triangles: TextureLayout,
    spheres: TextureLayout,
    cylinders: TextureLayout,
}

fn cmd_export(path: &str, out_dir: &str, settings: Settings) -> Result<()> {
    let scene = load_scene(path, settings)?;
    let data = scene.gpu_data()?;

    let out = Path::new(out_dir);
    std::fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;

    let files: [(&str, &[u8]); 5] = [
        ("nodes.bin", data.nodes_bytes()),
        ("refs.bin", data.refs_bytes()),
        ("triangles.bin", data.triangles_bytes()),
        ("spheres.bin", data.spheres_bytes()),
        ("cylinders.bin", data.cylinders_bytes()),
    ];
    for (name, bytes) in files {
        let file = out.join(name);
        std::fs::write(&file, bytes).with_context(|| format!("writing {}", file.display()))?;
        tracing::debug!("Wrote {} ({} bytes)", file.display(), bytes.len());
    }

    let manifest = ExportManifest {
        node_count: data.node_count,
        texels_per_node: molray::bvh::TEXELS_PER_NODE,
        nodes: data.nodes.layout,
        refs: data.refs.layout,
        triangles: data.triangles.layout,
        spheres: data.spheres.layout,
        cylinders: data.cylinders.layout,
    };
    let file = out.join("layout.json");
    std::fs::write(&file, serde_json::to_string_pretty(&manifest)?)
        .with_context(|| format!("writing {}", file.display()))?;

    println!("Exported {} nodes to {}", data.node_count, out.display());
    Ok(())
}
