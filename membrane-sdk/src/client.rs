use {
    tracing::{debug, info, warn},
    tokio::{
        io::{self, AsyncRead, AsyncWrite},
        net::TcpStream,
    },
    membrane_core::{
        frame::{read_message, write_message},
        protocol::{ClientMessage, InitRequest, ServerMessage},
    },
    crate::{error::SdkError, handler::TriggerHandler},
};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Worker side of the membrane stream. Handles one trigger at a time.
pub struct WorkerClient {
    inbound: BoxedReader,
    outbound: BoxedWriter,
}

impl WorkerClient {
    pub async fn connect(address: &str, name: Option<String>) -> Result<Self, SdkError> {
        let stream = TcpStream::connect(address).await
            .map_err(|source| SdkError::Connect { address: address.to_owned(), source })?;
        if let Err(err) = stream.set_nodelay(true) {
            warn!("failed to set nodelay on membrane connection: {err:?}");
        }
        Self::handshake(stream, name).await
    }

    /// Sends `Init` over an already open stream and waits for the membrane to accept it.
    pub async fn handshake<S>(stream: S, name: Option<String>) -> Result<Self, SdkError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (inbound, outbound) = io::split(stream);
        let mut client = Self {
            inbound: Box::new(inbound),
            outbound: Box::new(outbound),
        };

        write_message(&mut client.outbound, &ClientMessage::Init(InitRequest { name })).await?;
        match read_message::<_, ServerMessage>(&mut client.inbound).await? {
            Some(ServerMessage::InitAck) => {
                info!("connected to membrane");
                Ok(client)
            },
            Some(ServerMessage::InitRejected { reason }) => Err(SdkError::Rejected { reason }),
            Some(other) => Err(SdkError::UnexpectedMessage { message: format!("{other:?}") }),
            None => Err(SdkError::ClosedDuringHandshake),
        }
    }

    /// Serves triggers until the membrane closes the stream.
    pub async fn serve(mut self, handler: impl TriggerHandler) -> Result<(), SdkError> {
        loop {
            let message = match read_message::<_, ServerMessage>(&mut self.inbound).await? {
                Some(v) => v,
                None => {
                    info!("membrane closed the connection");
                    return Ok(());
                }
            };

            let (id, request) = match message {
                ServerMessage::TriggerRequest { id, request } => (id, request),
                other => {
                    warn!("ignoring unexpected message from membrane: {other:?}");
                    continue;
                }
            };

            debug!(request_id = %id, kind = %request.trigger.kind(), "handling trigger");
            let response = handler.call(request).await;
            write_message(&mut self.outbound, &ClientMessage::TriggerResponse { id, response }).await?;
        }
    }
}
