// ABOUTME: Demo client - claim a channel over one circuit and print its traffic
// ABOUTME: Shows the sink/channel traits a real client layers on top

use std::net::SocketAddr;

use argh::FromArgs;

use cacircuit::{
    CA_MINOR_PROTOCOL_REVISION, CallbackGuard, Circuit, CircuitChannel, ClientContext,
    ClientContextConfig, Command, DbrBasic, MessageHeader, ProtocolVersion, ResponseSink,
};

#[derive(FromArgs)]
/// Claim a channel on a CA server and print everything it sends back.
struct Args {
    /// server address, e.g. 10.0.0.7:5064
    #[argh(positional)]
    server: SocketAddr,

    /// channel name to monitor
    #[argh(positional)]
    channel: String,

    /// circuit priority (0-99)
    #[argh(option, default = "0")]
    priority: u16,
}

struct PrintSink;

impl ResponseSink for PrintSink {
    fn execute_response(
        &self,
        _guard: &mut CallbackGuard<'_>,
        _circuit: &Circuit,
        header: &MessageHeader,
        body: &[u8],
    ) -> bool {
        match Command::try_from(header.command) {
            Ok(cmd) => println!(
                "{cmd:?}: type={} count={} cid={} available={} payload={}B",
                header.data_type,
                header.element_count,
                header.cid,
                header.available,
                body.len()
            ),
            Err(_) => println!("command {}: payload={}B", header.command, body.len()),
        }
        true
    }
}

struct MonitoredChannel {
    name: String,
    cid: u32,
}

impl CircuitChannel for MonitoredChannel {
    fn connected(&self) -> bool {
        true
    }

    fn cid(&self) -> u32 {
        self.cid
    }

    fn sid(&self) -> u32 {
        // a full client fills this in from the claim response
        0
    }

    fn native_element_count(&self) -> u32 {
        1
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args: Args = argh::from_env();

    let ctx = ClientContext::new(ClientContextConfig::default());
    let circuit = Circuit::spawn(
        ctx,
        args.server,
        args.priority,
        ProtocolVersion::new(CA_MINOR_PROTOCOL_REVISION),
        Box::new(PrintSink),
    );

    if !circuit.wait_connected().await {
        eprintln!("unable to connect to {}", args.server);
        return Ok(());
    }
    println!("connected to {} as {:?}", args.server, circuit);

    let chan = MonitoredChannel {
        name: args.channel,
        cid: 1,
    };
    circuit.create_channel_request(&chan)?;
    circuit.subscription_add_request(&chan, 1, DbrBasic::Double as u16, 1, 0x1)?;
    circuit.flush_request();

    tokio::signal::ctrl_c().await?;
    circuit.clean_shutdown().await;
    circuit.join().await;
    Ok(())
}
