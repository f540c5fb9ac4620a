//! Peer address book: in-memory state mirrored to a flat file on disk, plus
//! DNS-seed bootstrap (§4.K).
//!
//! Each record is fixed-size (ipv4: 4 bytes, port: u16 LE, last_success: f64
//! LE, 14 bytes total) so the on-disk file is a flat array of records and a
//! deleted entry can be filled by swapping in the file's last record, rather
//! than rewriting everything after it.

use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::Path,
};

use spv_chain::parameters::Network;

/// The size in bytes of one on-disk address record.
pub const RECORD_LEN: u64 = 14;

/// A peer address and the last time this node successfully connected to it.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MetaAddr {
    pub addr: SocketAddr,
    /// Unix timestamp of the last successful connection, or `0.0` if this
    /// node has never connected to the address.
    pub last_success: f64,
}

impl MetaAddr {
    pub fn new(addr: SocketAddr, last_success: f64) -> MetaAddr {
        MetaAddr { addr, last_success }
    }

    fn ipv4(&self) -> Ipv4Addr {
        match self.addr.ip() {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
        }
    }

    fn write_record<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.ipv4().octets())?;
        writer.write_all(&self.addr.port().to_le_bytes())?;
        writer.write_all(&self.last_success.to_le_bytes())?;
        Ok(())
    }

    fn read_record<R: Read>(mut reader: R) -> io::Result<MetaAddr> {
        let mut ip_bytes = [0u8; 4];
        reader.read_exact(&mut ip_bytes)?;
        let mut port_bytes = [0u8; 2];
        reader.read_exact(&mut port_bytes)?;
        let mut ts_bytes = [0u8; 8];
        reader.read_exact(&mut ts_bytes)?;

        let ip = Ipv4Addr::from(ip_bytes);
        let port = u16::from_le_bytes(port_bytes);
        let last_success = f64::from_le_bytes(ts_bytes);
        Ok(MetaAddr::new(SocketAddr::new(IpAddr::V4(ip), port), last_success))
    }
}

/// The node's known-peer address book, backed by a flat file.
///
/// Entries are keyed by [`SocketAddr`] in memory; each also remembers its
/// slot index in the file so a removal can be done with a single swap-in
/// from the file's tail, rather than an O(n) rewrite.
pub struct AddressBook {
    file: File,
    slots: HashMap<SocketAddr, (MetaAddr, u64)>,
}

impl AddressBook {
    /// Open (creating if necessary) the address book file at `path`, loading
    /// any existing records into memory.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<AddressBook> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let len = file.seek(SeekFrom::End(0))?;
        let record_count = len / RECORD_LEN;
        file.seek(SeekFrom::Start(0))?;

        let mut slots = HashMap::new();
        for slot in 0..record_count {
            let addr = MetaAddr::read_record(&mut file)?;
            slots.insert(addr.addr, (addr, slot));
        }

        Ok(AddressBook { file, slots })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.slots.contains_key(addr)
    }

    /// Insert or update an address record, appending a new slot if the
    /// address is new.
    pub fn upsert(&mut self, addr: MetaAddr) -> io::Result<()> {
        let slot = match self.slots.get(&addr.addr) {
            Some((_, slot)) => *slot,
            None => self.slots.len() as u64,
        };
        self.file.seek(SeekFrom::Start(slot * RECORD_LEN))?;
        addr.write_record(&mut self.file)?;
        self.slots.insert(addr.addr, (addr, slot));
        Ok(())
    }

    /// Remove an address, filling the vacated slot from the file's last
    /// record so the file never grows a hole.
    pub fn remove(&mut self, addr: &SocketAddr) -> io::Result<()> {
        let (_, slot) = match self.slots.remove(addr) {
            Some(entry) => entry,
            None => return Ok(()),
        };
        let last_slot = self.slots.len() as u64;
        if slot == last_slot {
            self.file.set_len(slot * RECORD_LEN)?;
            return Ok(());
        }

        let moved = self
            .slots
            .iter()
            .find_map(|(a, (_, s))| if *s == last_slot { Some(*a) } else { None });
        if let Some(moved_addr) = moved {
            let (record, _) = self.slots[&moved_addr];
            self.file.seek(SeekFrom::Start(slot * RECORD_LEN))?;
            record.write_record(&mut self.file)?;
            self.slots.insert(moved_addr, (record, slot));
        }
        self.file.set_len(last_slot * RECORD_LEN)?;
        Ok(())
    }

    /// All known addresses, most recently successful first.
    pub fn addrs(&self) -> Vec<MetaAddr> {
        let mut addrs: Vec<MetaAddr> = self.slots.values().map(|(addr, _)| *addr).collect();
        addrs.sort_by(|a, b| b.last_success.partial_cmp(&a.last_success).unwrap());
        addrs
    }

    /// Resolve the network's DNS seeds and insert any IPv4 results on the
    /// network's default port. Only useful when the book is running low;
    /// callers check [`AddressBook::len`] against
    /// [`crate::constants::MIN_ADDRESS_BOOK_ENTRIES`] first.
    pub fn seed_from_dns(&mut self, network: Network) -> io::Result<()> {
        use std::net::ToSocketAddrs;

        let params = network.params();
        for seed in params.dns_seeds {
            let lookup = match (*seed, params.default_port).to_socket_addrs() {
                Ok(addrs) => addrs,
                Err(_) => continue,
            };
            for addr in lookup {
                if addr.is_ipv4() {
                    self.upsert(MetaAddr::new(addr, 0.0))?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn insert_persists_and_reloads() {
        let dir = TempDir::new("spv-addrbook").unwrap();
        let path = dir.path().join("peers.dat");

        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)), 8333);
        {
            let mut book = AddressBook::open(&path).unwrap();
            book.upsert(MetaAddr::new(addr, 12345.0)).unwrap();
        }

        let book = AddressBook::open(&path).unwrap();
        assert_eq!(book.len(), 1);
        assert!(book.contains(&addr));
    }

    #[test]
    fn remove_fills_vacated_slot_from_tail() {
        let dir = TempDir::new("spv-addrbook").unwrap();
        let path = dir.path().join("peers.dat");
        let mut book = AddressBook::open(&path).unwrap();

        let a = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)), 8333);
        let b = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(2, 2, 2, 2)), 8333);
        let c = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(3, 3, 3, 3)), 8333);
        book.upsert(MetaAddr::new(a, 1.0)).unwrap();
        book.upsert(MetaAddr::new(b, 2.0)).unwrap();
        book.upsert(MetaAddr::new(c, 3.0)).unwrap();

        book.remove(&a).unwrap();
        assert_eq!(book.len(), 2);
        assert!(book.contains(&b));
        assert!(book.contains(&c));

        drop(book);
        let book = AddressBook::open(&path).unwrap();
        assert_eq!(book.len(), 2);
    }
}
