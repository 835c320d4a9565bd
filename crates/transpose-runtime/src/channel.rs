use crate::{
    analysis::AccessStats,
    server::{ComputeServer, Handle, KernelLaunch, ServerError},
    storage::MemoryUsage,
};
use core::{future::Future, marker::PhantomData, pin::Pin};
use std::{sync::Arc, time::Instant};

/// A boxed future, returned by the asynchronous operations of the channel.
pub type DynFut<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Receiver of a server response.
pub type Response<T> = async_channel::Receiver<T>;

/// Create a channel using a multi-producer, single-consumer channel to communicate with
/// the compute server spawn on its own thread.
#[derive(Debug)]
pub struct MpscComputeChannel<Server>
where
    Server: ComputeServer,
{
    state: Arc<MpscComputeChannelState>,
    _server: PhantomData<fn() -> Server>,
}

#[derive(Debug)]
struct MpscComputeChannelState {
    sender: async_channel::Sender<Message>,
}

type Callback<Response> = async_channel::Sender<Response>;

enum Message {
    Create(Vec<u8>, Callback<Result<Handle, ServerError>>),
    Empty(usize, Callback<Result<Handle, ServerError>>),
    Fill(Handle, f32),
    Read(Vec<Handle>, Callback<Result<Vec<Vec<u8>>, ServerError>>),
    Launch(KernelLaunch),
    Analyse(KernelLaunch, Callback<Result<AccessStats, ServerError>>),
    Sync(Callback<Result<(), ServerError>>),
    Timestamp(Callback<Result<Instant, ServerError>>),
    MemoryUsage(Callback<MemoryUsage>),
    MemoryCleanup,
}

impl<Server> MpscComputeChannel<Server>
where
    Server: ComputeServer,
{
    /// Create a new mpsc compute channel, moving the server to its own thread.
    pub fn new(mut server: Server) -> Self {
        let (sender, receiver) = async_channel::unbounded::<Message>();

        std::thread::spawn(move || {
            log::trace!("Compute server started");

            // A dropped callback means the caller stopped waiting, the response is discarded.
            while let Ok(message) = receiver.recv_blocking() {
                match message {
                    Message::Create(data, callback) => {
                        let _ = callback.send_blocking(server.create(&data));
                    }
                    Message::Empty(size, callback) => {
                        let _ = callback.send_blocking(server.empty(size));
                    }
                    Message::Fill(handle, value) => {
                        server.fill(handle, value);
                    }
                    Message::Read(handles, callback) => {
                        let _ = callback.send_blocking(server.read(handles));
                    }
                    Message::Launch(launch) => {
                        server.launch(launch);
                    }
                    Message::Analyse(launch, callback) => {
                        let _ = callback.send_blocking(server.analyse(launch));
                    }
                    Message::Sync(callback) => {
                        let _ = callback.send_blocking(server.sync());
                    }
                    Message::Timestamp(callback) => {
                        let _ = callback.send_blocking(server.timestamp());
                    }
                    Message::MemoryUsage(callback) => {
                        let _ = callback.send_blocking(server.memory_usage());
                    }
                    Message::MemoryCleanup => {
                        server.memory_cleanup();
                    }
                };
            }

            log::trace!("Compute server stopped");
        });

        Self {
            state: Arc::new(MpscComputeChannelState { sender }),
            _server: PhantomData,
        }
    }

    fn send(&self, message: Message) -> Result<(), ServerError> {
        self.state
            .sender
            .send_blocking(message)
            .map_err(|_| ServerError::Disconnected)
    }

    fn request<T, F>(&self, message: F) -> Result<Response<T>, ServerError>
    where
        F: FnOnce(Callback<T>) -> Message,
    {
        let (callback, response) = async_channel::bounded(1);
        self.send(message(callback))?;
        Ok(response)
    }

    /// Given bytes, allocates device memory holding them.
    pub fn create(&self, data: &[u8]) -> Result<Handle, ServerError> {
        let data = data.to_vec();
        let response = self.request(|callback| Message::Create(data, callback))?;
        handle_response(response.recv_blocking())
    }

    /// Reserves `size` zeroed bytes of device memory.
    pub fn empty(&self, size: usize) -> Result<Handle, ServerError> {
        let response = self.request(|callback| Message::Empty(size, callback))?;
        handle_response(response.recv_blocking())
    }

    /// Enqueues a fill of the buffer.
    pub fn fill(&self, handle: Handle, value: f32) -> Result<(), ServerError> {
        self.send(Message::Fill(handle, value))
    }

    /// Given handles, returns owned resources as bytes once every previous task completed.
    pub fn read(&self, handles: Vec<Handle>) -> DynFut<Result<Vec<Vec<u8>>, ServerError>> {
        let sender = self.state.sender.clone();

        Box::pin(async move {
            let (callback, response) = async_channel::bounded(1);
            sender
                .send(Message::Read(handles, callback))
                .await
                .map_err(|_| ServerError::Disconnected)?;
            handle_response(response.recv().await)
        })
    }

    /// Enqueues a kernel launch.
    pub fn launch(&self, launch: KernelLaunch) -> Result<(), ServerError> {
        self.send(Message::Launch(launch))
    }

    /// Executes a kernel while recording its memory accesses.
    pub fn analyse(&self, launch: KernelLaunch) -> Result<AccessStats, ServerError> {
        let response = self.request(|callback| Message::Analyse(launch, callback))?;
        handle_response(response.recv_blocking())
    }

    /// Wait for the completion of every task sent before.
    pub fn sync(&self) -> DynFut<Result<(), ServerError>> {
        let sender = self.state.sender.clone();

        Box::pin(async move {
            let (callback, response) = async_channel::bounded(1);
            sender
                .send(Message::Sync(callback))
                .await
                .map_err(|_| ServerError::Disconnected)?;
            handle_response(response.recv().await)
        })
    }

    /// Enqueues a timestamp, the response is sent once every previous task completed.
    pub fn timestamp(&self) -> Result<Response<Result<Instant, ServerError>>, ServerError> {
        self.request(Message::Timestamp)
    }

    /// Get the current memory usage of the server.
    pub fn memory_usage(&self) -> Result<MemoryUsage, ServerError> {
        let response = self.request(Message::MemoryUsage)?;
        response.recv_blocking().map_err(|_| ServerError::Disconnected)
    }

    /// Ask the server to release memory that it can release.
    pub fn memory_cleanup(&self) -> Result<(), ServerError> {
        self.send(Message::MemoryCleanup)
    }
}

impl<Server: ComputeServer> Clone for MpscComputeChannel<Server> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            _server: PhantomData,
        }
    }
}

/// Flattens a server response, a closed callback means the server thread is gone.
pub(crate) fn handle_response<Response, Err>(
    response: Result<Result<Response, ServerError>, Err>,
) -> Result<Response, ServerError> {
    match response {
        Ok(val) => val,
        Err(_) => Err(ServerError::Disconnected),
    }
}
