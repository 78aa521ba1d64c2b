//! Partitioned append-only log transport.
//!
//! One topic directory holds `partition-<n>.log` files of length-prefixed
//! records plus a per-consumer-group offsets file. Producers append to a
//! fixed configured partition, so frames from one process keep their order;
//! no ordering is guaranteed across partitions. The consumer starts from the
//! last committed offsets — or the end of the log for a group that has never
//! committed — and commits on a configured interval.
//!
//! Layout:
//! ```text
//! <dir>/<topic>/partition-0.log     [u32 LE length][payload]...
//! <dir>/<topic>/partition-1.log
//! <dir>/<topic>/chat.offsets        JSON array of byte offsets
//! ```

use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use parley_shared::constants::LOG_CONSUMER_GROUP;

use crate::client::OverflowQueue;
use crate::transport::{Transport, TransportError};

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Data directory holding topic subdirectories.
    pub dir: PathBuf,
    pub topic: String,
    /// Number of partition files in the topic.
    pub partitions: u32,
    /// Partition this process appends to.
    pub partition: u32,
    /// Write timeout for appends; also the offset commit interval.
    pub timeout: Duration,
    /// How long the consumer sleeps when every partition is caught up.
    pub poll_interval: Duration,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data/log"),
            topic: "chat".to_string(),
            partitions: 1,
            partition: 0,
            timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(25),
        }
    }
}

struct Producer {
    file: File,
}

struct PartitionCursor {
    file: File,
    offset: u64,
}

struct Consumer {
    cursors: Vec<PartitionCursor>,
    /// Round-robin start index so one busy partition cannot starve others.
    next: usize,
    last_commit: Instant,
}

pub struct LogTransport {
    config: LogConfig,
    offsets_path: PathBuf,
    producer: tokio::sync::Mutex<Producer>,
    consumer: tokio::sync::Mutex<Consumer>,
    closed: AtomicBool,
}

impl LogTransport {
    pub async fn open(config: LogConfig) -> Result<Self, TransportError> {
        let topic_dir = config.dir.join(&config.topic);
        tokio::fs::create_dir_all(&topic_dir).await?;

        // Make sure every partition file exists before cursors open them.
        for partition in 0..config.partitions {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(partition_path(&topic_dir, partition))
                .await?;
        }

        let offsets_path = topic_dir.join(format!("{LOG_CONSUMER_GROUP}.offsets"));
        let committed = load_offsets(&offsets_path, config.partitions as usize).await?;

        let mut cursors = Vec::with_capacity(config.partitions as usize);
        for partition in 0..config.partitions {
            let path = partition_path(&topic_dir, partition);
            let file = File::open(&path).await?;
            let offset = match &committed {
                // A group that never committed starts at the end of the log.
                None => file.metadata().await?.len(),
                Some(offsets) => offsets[partition as usize],
            };
            cursors.push(PartitionCursor { file, offset });
        }

        let producer_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(partition_path(
                &topic_dir,
                config.partition % config.partitions,
            ))
            .await?;

        info!(
            topic = %config.topic,
            partitions = config.partitions,
            resumed = committed.is_some(),
            "log transport opened"
        );

        Ok(Self {
            config,
            offsets_path,
            producer: tokio::sync::Mutex::new(Producer {
                file: producer_file,
            }),
            consumer: tokio::sync::Mutex::new(Consumer {
                cursors,
                next: 0,
                last_commit: Instant::now(),
            }),
            closed: AtomicBool::new(false),
        })
    }

    async fn commit(&self, consumer: &mut Consumer) -> Result<(), TransportError> {
        let offsets: Vec<u64> = consumer.cursors.iter().map(|c| c.offset).collect();
        let encoded = serde_json::to_vec(&offsets)?;
        tokio::fs::write(&self.offsets_path, encoded).await?;
        consumer.last_commit = Instant::now();
        debug!(?offsets, "committed consumer offsets");
        Ok(())
    }

    async fn maybe_commit(&self, consumer: &mut Consumer) {
        if consumer.last_commit.elapsed() >= self.config.timeout {
            if let Err(e) = self.commit(consumer).await {
                warn!(error = %e, "offset commit failed");
            }
        }
    }
}

#[async_trait]
impl Transport for LogTransport {
    /// Appends never use the overflow queue: the log itself absorbs bursts.
    async fn publish(&self, _overflow: &OverflowQueue, frame: Vec<u8>) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let mut record = Vec::with_capacity(4 + frame.len());
        record.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        record.extend_from_slice(&frame);

        let mut producer = self.producer.lock().await;
        tokio::time::timeout(self.config.timeout, async {
            producer.file.write_all(&record).await?;
            producer.file.flush().await
        })
        .await
        .map_err(|_| TransportError::Timeout)??;

        Ok(())
    }

    async fn recv(&self) -> Option<Vec<u8>> {
        let mut consumer = self.consumer.lock().await;
        loop {
            let count = consumer.cursors.len();
            let mut delivered = None;
            for _ in 0..count {
                let idx = consumer.next;
                consumer.next = (idx + 1) % count;
                match read_record(&mut consumer.cursors[idx]).await {
                    Ok(Some(frame)) => {
                        delivered = Some(frame);
                        break;
                    }
                    Ok(None) => {}
                    Err(e) => warn!(partition = idx, error = %e, "log read failed"),
                }
            }

            self.maybe_commit(&mut consumer).await;

            if let Some(frame) = delivered {
                return Some(frame);
            }
            if self.closed.load(Ordering::SeqCst) {
                if let Err(e) = self.commit(&mut consumer).await {
                    warn!(error = %e, "final offset commit failed");
                }
                return None;
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

fn partition_path(topic_dir: &std::path::Path, partition: u32) -> PathBuf {
    topic_dir.join(format!("partition-{partition}.log"))
}

async fn load_offsets(
    path: &std::path::Path,
    partitions: usize,
) -> Result<Option<Vec<u64>>, TransportError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let mut offsets: Vec<u64> = serde_json::from_slice(&bytes)?;
            // Partition count may have grown since the last commit.
            offsets.resize(partitions, 0);
            Ok(Some(offsets))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Read the next complete record at the cursor, or `None` if the partition
/// is caught up (or the tail record is still being flushed).
async fn read_record(cursor: &mut PartitionCursor) -> std::io::Result<Option<Vec<u8>>> {
    let len = cursor.file.metadata().await?.len();
    if len < cursor.offset + 4 {
        return Ok(None);
    }

    cursor.file.seek(SeekFrom::Start(cursor.offset)).await?;
    let mut header = [0u8; 4];
    cursor.file.read_exact(&mut header).await?;
    let payload_len = u32::from_le_bytes(header) as u64;

    if len < cursor.offset + 4 + payload_len {
        return Ok(None);
    }

    let mut payload = vec![0u8; payload_len as usize];
    cursor.file.read_exact(&mut payload).await?;
    cursor.offset += 4 + payload_len;
    Ok(Some(payload))
}
