use anyhow::{bail, Context, Result};
use ivi_stream_compositor::controller::SystemCompositorControllerClient;
use ivi_stream_compositor::core::config::SystemCompositorControllerConfig;
use ivi_stream_compositor::core::ids::{IviLayerId, IviSurfaceId};
use ivi_stream_compositor::util::logging::init_tracing;

/// Display of the system compositor, if not `WAYLAND_DISPLAY`.
const DISPLAY_ENV: &str = "IVI_CONTROLLER_DISPLAY";

const USAGE: &str = "usage: ivi-control [--display <name>] <command>

commands:
  list
  visibility <ivi-id> <0|1>
  opacity <ivi-id> <0.0-1.0>
  rect <ivi-id> <x> <y> <width> <height>
  add-to-layer <ivi-id> <layer-id>
  remove-from-layer <ivi-id> <layer-id>
  layer-visibility <layer-id> <0|1>
  destroy <ivi-id>
  screenshot <file> [screen-id]";

#[derive(Debug, PartialEq)]
enum Command {
    List,
    Visibility(IviSurfaceId, bool),
    Opacity(IviSurfaceId, f32),
    Rect(IviSurfaceId, i32, i32, i32, i32),
    AddToLayer(IviSurfaceId, IviLayerId),
    RemoveFromLayer(IviSurfaceId, IviLayerId),
    LayerVisibility(IviLayerId, bool),
    Destroy(IviSurfaceId),
    Screenshot(String, i32),
}

fn number<T: std::str::FromStr>(args: &[String], index: usize, what: &str) -> Result<T> {
    let raw = args.get(index).with_context(|| format!("missing {}\n{}", what, USAGE))?;
    raw.parse().map_err(|_| anyhow::anyhow!("invalid {} '{}'", what, raw))
}

fn flag(args: &[String], index: usize) -> Result<bool> {
    match number::<u32>(args, index, "visibility")? {
        0 => Ok(false),
        1 => Ok(true),
        other => bail!("visibility must be 0 or 1, got {}", other),
    }
}

fn parse_command(args: &[String]) -> Result<Command> {
    let Some(name) = args.first() else {
        bail!("{}", USAGE);
    };
    let surface = || number(args, 1, "ivi-id").map(IviSurfaceId);

    let command = match name.as_str() {
        "list" => Command::List,
        "visibility" => Command::Visibility(surface()?, flag(args, 2)?),
        "opacity" => Command::Opacity(surface()?, number(args, 2, "opacity")?),
        "rect" => Command::Rect(
            surface()?,
            number(args, 2, "x")?,
            number(args, 3, "y")?,
            number(args, 4, "width")?,
            number(args, 5, "height")?,
        ),
        "add-to-layer" => Command::AddToLayer(surface()?, IviLayerId(number(args, 2, "layer-id")?)),
        "remove-from-layer" => Command::RemoveFromLayer(surface()?, IviLayerId(number(args, 2, "layer-id")?)),
        "layer-visibility" => Command::LayerVisibility(IviLayerId(number(args, 1, "layer-id")?), flag(args, 2)?),
        "destroy" => Command::Destroy(surface()?),
        "screenshot" => {
            let file = args.get(1).with_context(|| format!("missing file name\n{}", USAGE))?;
            let screen = if args.len() > 2 { number(args, 2, "screen-id")? } else { -1 };
            Command::Screenshot(file.clone(), screen)
        }
        other => bail!("unknown command '{}'\n{}", other, USAGE),
    };
    Ok(command)
}

fn run(client: &mut SystemCompositorControllerClient, command: Command) -> Result<()> {
    match command {
        Command::List => {
            for id in client.list_ivi_surfaces()? {
                match client.surface_stats(id) {
                    Some(stats) => println!(
                        "{} pid={} process={} frames={} redraws={}",
                        id, stats.pid, stats.process_name, stats.frame_count, stats.redraw_count
                    ),
                    None => println!("{}", id),
                }
            }
            for layer in client.layers() {
                println!("layer {}", layer);
            }
            return Ok(());
        }
        Command::Screenshot(file, screen) => {
            client.do_screenshot(&file, screen)?;
        }
        Command::Visibility(surface, visible) => client.set_surface_visibility(surface, visible),
        Command::Opacity(surface, opacity) => client.set_surface_opacity(surface, opacity),
        Command::Rect(surface, x, y, width, height) => {
            client.set_surface_destination_rectangle(surface, x, y, width, height)
        }
        Command::AddToLayer(surface, layer) => client.add_surface_to_layer(surface, layer),
        Command::RemoveFromLayer(surface, layer) => client.remove_surface_from_layer(surface, layer)?,
        Command::LayerVisibility(layer, visible) => client.set_layer_visibility(layer, visible),
        Command::Destroy(surface) => client.destroy_surface(surface)?,
    }

    if client.has_staged_changes() {
        client.commit_and_flush()?;
    }
    // errors for this command arrive before the roundtrip completes
    client.roundtrip()?;

    let errors = client.take_remote_errors();
    if let Some(first) = errors.first() {
        bail!(
            "system compositor reported {} error(s), first: {} (code {})",
            errors.len(),
            first.error_text,
            first.error_code
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    init_tracing("info");

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let mut config = SystemCompositorControllerConfig {
        display_name: std::env::var(DISPLAY_ENV).ok(),
    };
    if args.first().map(String::as_str) == Some("--display") {
        if args.len() < 2 {
            bail!("--display needs a value\n{}", USAGE);
        }
        config.display_name = Some(args[1].clone());
        args.drain(..2);
    }

    let command = parse_command(&args)?;
    let mut client = SystemCompositorControllerClient::connect(&config)?;
    run(&mut client, command)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command(&args("list")).unwrap(), Command::List);
        assert_eq!(
            parse_command(&args("rect 5 1 2 30 40")).unwrap(),
            Command::Rect(IviSurfaceId(5), 1, 2, 30, 40)
        );
        assert_eq!(
            parse_command(&args("layer-visibility 3 0")).unwrap(),
            Command::LayerVisibility(IviLayerId(3), false)
        );
        assert_eq!(
            parse_command(&args("screenshot /tmp/a.png")).unwrap(),
            Command::Screenshot("/tmp/a.png".to_string(), -1)
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_command(&[]).is_err());
        assert!(parse_command(&args("visibility 5 2")).is_err());
        assert!(parse_command(&args("opacity x 0.5")).is_err());
        assert!(parse_command(&args("rect 5 1 2")).is_err());
        assert!(parse_command(&args("teleport 5")).is_err());
    }
}
