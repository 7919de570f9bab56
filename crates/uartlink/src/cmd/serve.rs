use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uartlink_bridge::{Bridge, BridgeConfig, ListenConfig, ResetTiming};
use uartlink_transport::{SerialConfig, SerialUart};

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{bridge_error, io_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_json, print_table, OutputFormat};

#[derive(Serialize)]
struct ResolvedConfig<'a> {
    serial: &'a SerialConfig,
    listen: &'a ListenConfig,
    bridge: &'a BridgeConfig,
}

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let (serial, listen, bridge_config) = resolve(&args)?;

    if args.print_config {
        print_config(
            &ResolvedConfig {
                serial: &serial,
                listen: &listen,
                bridge: &bridge_config,
            },
            format,
        );
        return Ok(SUCCESS);
    }

    let uart = SerialUart::open(&serial).map_err(|err| transport_error("open failed", err))?;
    let reader = uart
        .reader()
        .map_err(|err| transport_error("serial clone failed", err))?;
    let pins = uart
        .pins()
        .map_err(|err| transport_error("serial clone failed", err))?;
    let bridge = Bridge::with_core_commands(bridge_config, uart, pins)
        .map_err(|err| bridge_error("bridge setup failed", err))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))?;

    tracing::info!(device = %serial.device, line = %serial.line, "starting bridge");
    runtime.block_on(async move {
        let shutdown = CancellationToken::new();
        let on_signal = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received");
                on_signal.cancel();
            }
        });
        uartlink_bridge::serve(bridge, reader, &listen, shutdown)
            .await
            .map_err(|err| bridge_error("bridge failed", err))
    })?;

    Ok(SUCCESS)
}

fn resolve(args: &ServeArgs) -> CliResult<(SerialConfig, ListenConfig, BridgeConfig)> {
    let mut serial = SerialConfig::new(args.device.clone()).with_line(args.line.settings()?);
    serial.reset_line = args.reset_line.into();
    serial.isp_line = args.isp_line.into();

    let listen = ListenConfig {
        bind: args.bind,
        port: args.port,
        programming_port: args.programming_port,
    };

    let bridge = BridgeConfig {
        slip_enabled: !args.no_slip,
        console_sniff: !args.no_console_sniff,
        max_packet_len: args.max_packet_len,
        reset: ResetTiming {
            reset_hold: parse_duration(&args.reset_hold)?,
            isp_hold: parse_duration(&args.isp_hold)?,
            settle: parse_duration(&args.settle)?,
        },
        ..BridgeConfig::default()
    }
    .with_max_sessions(args.max_sessions)
    .with_tx_buffer_size(args.tx_buffer_size)
    .with_overflow_timeout(parse_duration(&args.overflow_timeout)?);

    Ok((serial, listen, bridge))
}

fn print_config(config: &ResolvedConfig<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(config),
        OutputFormat::Table | OutputFormat::Pretty => {
            let serial = config.serial;
            let listen = config.listen;
            let bridge = config.bridge;
            print_table(
                &["SETTING", "VALUE"],
                vec![
                    vec!["device".into(), serial.device.clone()],
                    vec!["line".into(), serial.line.to_string()],
                    vec!["bridge".into(), listen.bridge_addr().to_string()],
                    vec!["programming".into(), listen.programming_addr().to_string()],
                    vec!["max_sessions".into(), bridge.max_sessions.to_string()],
                    vec!["tx_buffer_size".into(), bridge.tx_buffer_size.to_string()],
                    vec![
                        "overflow_timeout".into(),
                        format!("{:?}", bridge.overflow_timeout),
                    ],
                    vec!["slip".into(), bridge.slip_enabled.to_string()],
                ],
            );
        }
    }
}
