//! P-DATA fragmentation and reassembly.

use crate::pdu::reader::read_pdu;
use crate::pdu::{PDataValueType, Pdu};
use std::collections::VecDeque;
use std::io::{Read, Write};

/// A P-Data value writer.
///
/// This exposes an API to iteratively construct and send data messages
/// to another node.
/// Using this as a [standard writer](std::io::Write)
/// will automatically split the incoming bytes
/// into separate PDUs if they do not fit in a single one.
///
/// Use an association's `send_pdata` method
/// to create a new P-Data value writer.
#[must_use]
pub struct PDataWriter<W: Write> {
    buffer: Vec<u8>,
    stream: W,
    presentation_context_id: u8,
    value_type: PDataValueType,
    max_data_length: u32,
}

impl<W> PDataWriter<W>
where
    W: Write,
{
    /// Construct a new P-Data value writer for data set bytes.
    pub(crate) fn new(stream: W, presentation_context_id: u8, max_pdu_length: u32) -> Self {
        Self::new_with_type(
            stream,
            presentation_context_id,
            max_pdu_length,
            PDataValueType::Data,
        )
    }

    /// Construct a new P-Data value writer for the given value type.
    pub(crate) fn new_with_type(
        stream: W,
        presentation_context_id: u8,
        max_pdu_length: u32,
        value_type: PDataValueType,
    ) -> Self {
        let max_data_length = calculate_max_data_len_single(max_pdu_length);
        PDataWriter {
            stream,
            presentation_context_id,
            value_type,
            max_data_length,
            buffer: Vec::with_capacity(max_data_length as usize),
        }
    }

    /// Send the header of a single P-Data PDU,
    /// containing a single data fragment.
    fn send_pdata_header(&mut self, data_len: u32, is_last: bool) -> std::io::Result<()> {
        let mut message_header = 0x00;
        if self.value_type == PDataValueType::Command {
            message_header |= 0x01;
        }
        if is_last {
            message_header |= 0x02;
        }

        let pdu_len_bytes = (data_len + 2 + 4).to_be_bytes();
        let data_len_bytes = (data_len + 2).to_be_bytes();
        let header = [
            // PDU-type + reserved byte
            0x04,
            0x00,
            // full PDU length
            pdu_len_bytes[0],
            pdu_len_bytes[1],
            pdu_len_bytes[2],
            pdu_len_bytes[3],
            // presentation data length (data + 2 properties below)
            data_len_bytes[0],
            data_len_bytes[1],
            data_len_bytes[2],
            data_len_bytes[3],
            // presentation context id
            self.presentation_context_id,
            // message control header
            message_header,
        ];

        self.stream.write_all(&header)
    }

    /// Send the accumulated data as the last fragment of its message.
    pub fn finish(mut self) -> std::io::Result<()> {
        self.finish_impl()?;
        Ok(())
    }

    fn finish_impl(&mut self) -> std::io::Result<()> {
        self.dispatch_excess_data()?;
        // send the last PDU, which may be empty
        self.send_pdata_header(self.buffer.len() as u32, true)?;
        self.stream.write_all(&self.buffer[..])?;
        self.buffer.clear();
        self.stream.flush()
    }

    fn dispatch_excess_data(&mut self) -> std::io::Result<()> {
        while self.buffer.len() > self.max_data_length as usize {
            self.send_pdata_header(self.max_data_length, false)?;
            let data = &self.buffer[0..self.max_data_length as usize];
            self.stream.write_all(data)?;
            self.buffer.drain(0..self.max_data_length as usize);
        }
        Ok(())
    }
}

impl<W> Write for PDataWriter<W>
where
    W: Write,
{
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend(buf);
        self.dispatch_excess_data()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        // do nothing: fragment boundaries are decided by max PDU size
        Ok(())
    }
}

/// Determine the maximum length of actual data
/// when encapsulated in a PDU with the given length property.
/// Does not account for the first 2 bytes (type + reserved).
#[inline]
fn calculate_max_data_len_single(pdu_len: u32) -> u32 {
    pdu_len
    // data length
    - 4
    // control header
    - 2
}

/// A P-Data value reader.
///
/// Reassembles a single command or data set from consecutive
/// P-DATA-TF PDUs, in network order, until a fragment marked
/// as the last one has been consumed.
///
/// Use an association's `receive_pdata` method
/// to create a new P-Data value reader.
#[must_use]
pub struct PDataReader<'a, R> {
    stream: &'a mut R,
    buffer: VecDeque<u8>,
    presentation_context_id: Option<u8>,
    max_pdu_length: u32,
    last_seen: bool,
}

impl<'a, R> PDataReader<'a, R>
where
    R: Read,
{
    pub(crate) fn new(stream: &'a mut R, max_pdu_length: u32) -> Self {
        PDataReader {
            stream,
            buffer: VecDeque::new(),
            presentation_context_id: None,
            max_pdu_length,
            last_seen: false,
        }
    }

    /// The presentation context of the message being read,
    /// known after the first fragment.
    pub fn presentation_context_id(&self) -> Option<u8> {
        self.presentation_context_id
    }
}

impl<R> Read for PDataReader<'_, R>
where
    R: Read,
{
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        while self.buffer.is_empty() {
            if self.last_seen {
                return Ok(0);
            }
            let pdu = read_pdu(self.stream, self.max_pdu_length, false)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            match pdu {
                Pdu::PData { data } => {
                    for value in data {
                        match self.presentation_context_id {
                            Some(id) if id != value.presentation_context_id => {
                                return Err(std::io::Error::new(
                                    std::io::ErrorKind::InvalidData,
                                    "presentation context ID changed mid-message",
                                ));
                            }
                            _ => {
                                self.presentation_context_id =
                                    Some(value.presentation_context_id)
                            }
                        }
                        self.buffer.extend(value.data);
                        self.last_seen = value.is_last;
                    }
                }
                pdu => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("unexpected {} while reading P-DATA", pdu.short_description()),
                    ))
                }
            }
        }
        let n = buf.len().min(self.buffer.len());
        for (i, byte) in self.buffer.drain(0..n).enumerate() {
            buf[i] = byte;
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::{PDataReader, PDataWriter};
    use crate::pdu::{read_pdu, PDataValueType, Pdu};
    use crate::MINIMUM_PDU_SIZE;

    #[test]
    fn write_pdata_and_finish() {
        let presentation_context_id = 12;

        let mut buf = Vec::new();
        {
            let mut writer = PDataWriter::new(&mut buf, presentation_context_id, MINIMUM_PDU_SIZE);
            writer.write_all(&(0..64).collect::<Vec<u8>>()).unwrap();
            writer.finish().unwrap();
        }

        let mut cursor = &buf[..];
        let same_pdu = read_pdu(&mut cursor, MINIMUM_PDU_SIZE, true).unwrap();

        match same_pdu {
            Pdu::PData { data } => {
                let data_1 = &data[0];
                assert_eq!(data_1.value_type, PDataValueType::Data);
                assert_eq!(data_1.presentation_context_id, presentation_context_id);
                assert!(data_1.is_last);
                assert_eq!(data_1.data, (0..64).collect::<Vec<u8>>());
            }
            pdu => panic!("Expected PData, got {:?}", pdu),
        }

        assert_eq!(cursor.len(), 0);
    }

    #[test]
    fn write_large_pdata_and_finish() {
        let presentation_context_id = 32;

        let my_data: Vec<_> = (0..9000).map(|x| x as u8).collect();

        let mut buf = Vec::new();
        {
            let mut writer = PDataWriter::new(&mut buf, presentation_context_id, MINIMUM_PDU_SIZE);
            writer.write_all(&my_data).unwrap();
            writer.finish().unwrap();
        }

        let mut cursor = &buf[..];
        let mut pdvs = Vec::new();
        while !cursor.is_empty() {
            match read_pdu(&mut cursor, MINIMUM_PDU_SIZE, true).unwrap() {
                Pdu::PData { mut data } => pdvs.append(&mut data),
                pdu => panic!("Expected PData, got {:?}", pdu),
            }
        }
        assert!(pdvs.len() > 1, "data should have been fragmented");
        assert!(pdvs[..pdvs.len() - 1].iter().all(|pdv| !pdv.is_last));
        assert!(pdvs.last().unwrap().is_last);

        // no fragment may exceed the maximum PDU size
        for pdv in &pdvs {
            assert!(pdv.data.len() as u32 <= MINIMUM_PDU_SIZE - 6);
        }

        // reassembly restores the original bytes
        let all_data: Vec<u8> = pdvs.into_iter().flat_map(|pdv| pdv.data).collect();
        assert_eq!(all_data, my_data);
    }

    #[test]
    fn reader_reassembles_fragments() {
        let presentation_context_id = 3;
        let my_data: Vec<_> = (0..10_000).map(|x| (x % 251) as u8).collect();

        let mut buf = Vec::new();
        {
            let mut writer = PDataWriter::new(&mut buf, presentation_context_id, MINIMUM_PDU_SIZE);
            writer.write_all(&my_data).unwrap();
            writer.finish().unwrap();
        }

        let mut cursor = &buf[..];
        let mut reader = PDataReader::new(&mut cursor, MINIMUM_PDU_SIZE);
        let mut reassembled = Vec::new();
        reader.read_to_end(&mut reassembled).unwrap();
        assert_eq!(reassembled, my_data);
        assert_eq!(reader.presentation_context_id(), Some(presentation_context_id));
    }
}
