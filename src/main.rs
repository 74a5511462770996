use std::time::Duration;

use anyhow::{bail, Context, Result};
use ivi_stream_compositor::core::ids::{IviSurfaceId, SceneId, StreamTextureHandle};
use ivi_stream_compositor::core::{create_embedded_compositor, CompositorBackend, EmbeddedCompositingConfig};
use ivi_stream_compositor::stream::{MemoryTextureStore, StreamTextureManager};
use ivi_stream_compositor::util::logging::init_tracing;

const DEFAULT_SOCKET_NAME: &str = "wayland-ivi-0";
const DEFAULT_TICK: Duration = Duration::from_millis(16);
/// Ticks between two state dumps
const LOG_INFO_INTERVAL: u64 = 600;

const USAGE: &str = "usage: ivi-stream-compositor [--socket <name>] [--group <group>] [--dummy] \
[--link <ivi-id>]... [--frames <n>] [--tick-ms <ms>]";

#[derive(Debug, Default)]
struct Options {
    socket_name: Option<String>,
    socket_group: Option<String>,
    dummy: bool,
    links: Vec<IviSurfaceId>,
    frames: Option<u64>,
    tick: Option<Duration>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Options> {
    let mut options = Options::default();
    while let Some(arg) = args.next() {
        let mut value = |name: &str| args.next().with_context(|| format!("{} needs a value\n{}", name, USAGE));
        match arg.as_str() {
            "--socket" => options.socket_name = Some(value("--socket")?),
            "--group" => options.socket_group = Some(value("--group")?),
            "--dummy" => options.dummy = true,
            "--link" => {
                let id: u32 = value("--link")?.parse().context("--link expects an ivi-id")?;
                options.links.push(IviSurfaceId(id));
            }
            "--frames" => options.frames = Some(value("--frames")?.parse().context("--frames expects a number")?),
            "--tick-ms" => {
                let ms: u64 = value("--tick-ms")?.parse().context("--tick-ms expects milliseconds")?;
                options.tick = Some(Duration::from_millis(ms));
            }
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            other => bail!("unknown argument '{}'\n{}", other, USAGE),
        }
    }
    Ok(options)
}

fn main() -> Result<()> {
    init_tracing("info,ivi_stream_compositor=debug");

    let options = parse_args(std::env::args().skip(1))?;

    let mut config = EmbeddedCompositingConfig::from_env();
    if let Some(name) = options.socket_name {
        config = config.with_socket_name(name);
    }
    if let Some(group) = options.socket_group {
        config = config.with_socket_group(group);
    }
    if !config.has_socket() {
        config = config.with_socket_name(DEFAULT_SOCKET_NAME);
    }
    let backend = if options.dummy {
        CompositorBackend::Dummy
    } else {
        CompositorBackend::Wayland
    };

    let compositor = create_embedded_compositor(backend, config);
    let mut manager = StreamTextureManager::new(compositor, MemoryTextureStore::new());

    let scene = SceneId(0);
    let stream_textures: Vec<(StreamTextureHandle, IviSurfaceId)> = options
        .links
        .iter()
        .enumerate()
        .map(|(index, source)| (StreamTextureHandle(index as u32), *source))
        .collect();
    for (handle, source) in &stream_textures {
        manager.ref_stream_texture(*handle, *source, scene);
    }

    let tick = options.tick.unwrap_or(DEFAULT_TICK);
    tracing::info!(
        "Running with {} stream texture(s), tick {:?}{}",
        stream_textures.len(),
        tick,
        options.frames.map(|n| format!(", {} frames", n)).unwrap_or_default()
    );

    let mut frame = 0u64;
    while options.frames.map_or(true, |n| frame < n) {
        manager.compositor_mut().wait_for_client_activity(tick);
        manager.process_client_requests();

        let updates = manager.upload_resources_and_get_updates();
        for (source, frames) in &updates.committed_frames {
            tracing::trace!("ivi-id {}: {} new frame(s)", source, frames);
        }

        let changes = manager.dispatch_state_changes();
        for handle in changes.stream_textures.get(&scene).into_iter().flatten() {
            if let Some((_, source)) = stream_textures.iter().find(|(h, _)| h == handle) {
                let available = manager.composited_texture(*source).is_valid();
                tracing::info!(
                    "Stream texture {} (ivi-id {}): content {}",
                    handle,
                    source,
                    if available { "available" } else { "unavailable" }
                );
            }
        }
        for source in &changes.new_streams {
            tracing::debug!("New stream source {}", source);
        }
        for source in &changes.obsolete_streams {
            tracing::debug!("Obsolete stream source {}", source);
        }

        manager.notify_clients();

        frame += 1;
        if frame % LOG_INFO_INTERVAL == 0 {
            manager.log_infos();
        }
    }

    manager.log_infos();
    Ok(())
}
