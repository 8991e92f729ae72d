//! WMI `__InstanceCreationEvent` subscription for `Win32_Process`.

use super::CreationSource;
use futures::{Stream, StreamExt};
use std::io;
use std::pin::Pin;
use std::time::Duration;
use wmi::{COMLibrary, IWbemClassWrapper, WMIConnection, WMIResult};

type Events = Pin<Box<dyn Stream<Item = WMIResult<IWbemClassWrapper>>>>;

pub struct WmiCreationSource {
    events: Events,
    rt: tokio::runtime::Runtime,
    _con: WMIConnection,
}

impl WmiCreationSource {
    /// Must run on the thread that will wait on the subscription (COM apartment).
    pub fn open(target: &str) -> io::Result<Self> {
        let com = COMLibrary::new().map_err(to_io)?;
        let con = WMIConnection::new(com).map_err(to_io)?;
        let query = format!(
            "SELECT * FROM __InstanceCreationEvent WITHIN 1 \
             WHERE TargetInstance ISA 'Win32_Process' \
             AND TargetInstance.Name = '{}'",
            target.replace('\\', "\\\\").replace('\'', "\\'")
        );
        let events: Events = Box::pin(con.async_raw_notification(query).map_err(to_io)?);
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        Ok(Self {
            events,
            rt,
            _con: con,
        })
    }
}

impl CreationSource for WmiCreationSource {
    fn next_creations(&mut self, timeout: Duration) -> io::Result<usize> {
        let events = &mut self.events;
        let next = self
            .rt
            .block_on(async move { tokio::time::timeout(timeout, events.next()).await });
        match next {
            Err(_elapsed) => Ok(0),
            Ok(Some(Ok(_))) => Ok(1),
            Ok(Some(Err(e))) => Err(to_io(e)),
            Ok(None) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "wmi notification stream closed",
            )),
        }
    }
}

fn to_io(e: wmi::WMIError) -> io::Error {
    io::Error::other(e.to_string())
}
