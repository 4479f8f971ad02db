use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};

use super::error::{Result, ZipError};

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: u32 = 0x0403_4b50;
pub const LFH_SIZE: usize = 30;

/// Data descriptor - 16 bytes with the (optional) signature
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x0807_4b50;
pub const DATA_DESCRIPTOR_SIZE: usize = 16;

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: u32 = 0x0201_4b50;
pub const CDFH_MIN_SIZE: usize = 46;

/// "Version needed to extract" / "version made by" written for every record (2.0).
pub const ZIP_VERSION: u16 = 20;

/// General purpose flag: CRC and sizes follow the data in a data descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
/// General purpose flag: name and comment are UTF-8.
pub const FLAG_UTF8: u16 = 0x0800;

/// DOS date for 1980-01-01, the earliest representable day.
pub const DOS_EPOCH_DATE: u16 = (1 << 5) | 1;

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflated,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflated,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflated => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }

    /// Reject anything this codec cannot read or write.
    pub fn supported(self) -> Result<Self> {
        match self {
            CompressionMethod::Unknown(v) => Err(ZipError::UnsupportedMethod(v)),
            method => Ok(method),
        }
    }
}

/// Metadata of one archive entry.
///
/// Fields that are not known yet are `None`. When reading an entry whose sizes
/// are deferred to a data descriptor, `size`, `compressed_size` and `crc` stay
/// `None` until the descriptor has been consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    /// Forward-slash separated path; a trailing `/` marks a directory.
    pub name: String,
    pub size: Option<u64>,
    pub compressed_size: Option<u64>,
    pub crc: Option<u32>,
    /// `None` means "use the writer's default".
    pub method: Option<CompressionMethod>,
    /// Packed DOS timestamp: date in the high 16 bits, time in the low 16 bits.
    pub time: Option<u32>,
    pub comment: Option<String>,
    pub extra: Option<Vec<u8>>,
}

impl ZipEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
            compressed_size: None,
            crc: None,
            method: None,
            time: None,
            comment: None,
            extra: None,
        }
    }

    /// A STORED entry whose size and CRC are taken from `data`.
    ///
    /// STORED entries must declare both before the local header is written,
    /// so this is the usual way to build one.
    pub fn stored(name: impl Into<String>, data: &[u8]) -> Self {
        Self {
            size: Some(data.len() as u64),
            compressed_size: Some(data.len() as u64),
            crc: Some(crc32fast::hash(data)),
            method: Some(CompressionMethod::Stored),
            ..Self::new(name)
        }
    }

    pub fn is_directory(&self) -> bool {
        self.name.ends_with('/')
    }

    /// Raw DOS time field (defaults to midnight).
    pub fn dos_time(&self) -> u16 {
        self.time.map_or(0, |t| (t & 0xFFFF) as u16)
    }

    /// Raw DOS date field (defaults to 1980-01-01).
    pub fn dos_date(&self) -> u16 {
        self.time.map_or(DOS_EPOCH_DATE, |t| (t >> 16) as u16)
    }

    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let date = self.dos_date();
        let day = (date & 0x1F) as u8;
        let month = ((date >> 5) & 0x0F) as u8;
        let year = ((date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        let time = self.dos_time();
        let second = ((time & 0x1F) * 2) as u8;
        let minute = ((time >> 5) & 0x3F) as u8;
        let hour = ((time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }

    /// Pack a calendar timestamp into the DOS format.
    ///
    /// Years outside 1980..=2107 are clamped and seconds lose their lowest bit.
    pub fn set_mod_datetime(
        &mut self,
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
    ) {
        let year = year.clamp(1980, 2107) - 1980;
        let date = (year << 9) | (u16::from(month & 0x0F) << 5) | u16::from(day & 0x1F);
        let time = (u16::from(hour & 0x1F) << 11)
            | (u16::from(minute & 0x3F) << 5)
            | u16::from((second / 2) & 0x1F);
        self.time = Some((u32::from(date) << 16) | u32::from(time));
    }
}

/// Local File Header, minus its signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name: Vec<u8>,
    pub extra: Vec<u8>,
}

impl LocalFileHeader {
    /// Parse the fixed fields and the name/extra bytes that follow an
    /// already consumed signature.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let truncated = || ZipError::truncated("truncated local file header");

        let version_needed = reader.read_u16::<LittleEndian>().map_err(truncated())?;
        let flags = reader.read_u16::<LittleEndian>().map_err(truncated())?;
        let compression_method = reader.read_u16::<LittleEndian>().map_err(truncated())?;
        let last_mod_time = reader.read_u16::<LittleEndian>().map_err(truncated())?;
        let last_mod_date = reader.read_u16::<LittleEndian>().map_err(truncated())?;
        let crc32 = reader.read_u32::<LittleEndian>().map_err(truncated())?;
        let compressed_size = reader.read_u32::<LittleEndian>().map_err(truncated())?;
        let uncompressed_size = reader.read_u32::<LittleEndian>().map_err(truncated())?;
        let file_name_length = reader.read_u16::<LittleEndian>().map_err(truncated())?;
        let extra_field_length = reader.read_u16::<LittleEndian>().map_err(truncated())?;

        let mut file_name = vec![0u8; file_name_length as usize];
        reader
            .read_exact(&mut file_name)
            .map_err(ZipError::truncated("truncated file name"))?;
        let mut extra = vec![0u8; extra_field_length as usize];
        reader
            .read_exact(&mut extra)
            .map_err(ZipError::truncated("truncated extra field"))?;

        Ok(Self {
            version_needed,
            flags,
            compression_method,
            last_mod_time,
            last_mod_date,
            crc32,
            compressed_size,
            uncompressed_size,
            file_name,
            extra,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(LFH_SIGNATURE)?;
        writer.write_u16::<LittleEndian>(self.version_needed)?;
        writer.write_u16::<LittleEndian>(self.flags)?;
        writer.write_u16::<LittleEndian>(self.compression_method)?;
        writer.write_u16::<LittleEndian>(self.last_mod_time)?;
        writer.write_u16::<LittleEndian>(self.last_mod_date)?;
        writer.write_u32::<LittleEndian>(self.crc32)?;
        writer.write_u32::<LittleEndian>(self.compressed_size)?;
        writer.write_u32::<LittleEndian>(self.uncompressed_size)?;
        writer.write_u16::<LittleEndian>(self.file_name.len() as u16)?;
        writer.write_u16::<LittleEndian>(self.extra.len() as u16)?;
        writer.write_all(&self.file_name)?;
        writer.write_all(&self.extra)
    }

    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }
}

/// Trailing per-entry record carrying CRC and sizes when bit 3 is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
}

impl DataDescriptor {
    /// Read a descriptor whose leading signature may or may not be present.
    ///
    /// If the first word is not the signature it is the CRC itself. A CRC that
    /// happens to equal the signature is misread; the format offers no way to
    /// tell the two apart.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let truncated = || ZipError::truncated("truncated data descriptor");

        let mut crc32 = reader.read_u32::<LittleEndian>().map_err(truncated())?;
        if crc32 == DATA_DESCRIPTOR_SIGNATURE {
            crc32 = reader.read_u32::<LittleEndian>().map_err(truncated())?;
        } else {
            log::debug!("data descriptor without signature");
        }
        let compressed_size = reader.read_u32::<LittleEndian>().map_err(truncated())?;
        let uncompressed_size = reader.read_u32::<LittleEndian>().map_err(truncated())?;

        Ok(Self {
            crc32,
            compressed_size,
            uncompressed_size,
        })
    }

    /// Parse a signed descriptor from exactly [`DATA_DESCRIPTOR_SIZE`] bytes.
    pub fn from_signed_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < DATA_DESCRIPTOR_SIZE {
            return None;
        }
        let mut cursor = Cursor::new(data);
        if cursor.read_u32::<LittleEndian>().ok()? != DATA_DESCRIPTOR_SIGNATURE {
            return None;
        }
        Some(Self {
            crc32: cursor.read_u32::<LittleEndian>().ok()?,
            compressed_size: cursor.read_u32::<LittleEndian>().ok()?,
            uncompressed_size: cursor.read_u32::<LittleEndian>().ok()?,
        })
    }

    /// Always written with the signature.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(DATA_DESCRIPTOR_SIGNATURE)?;
        writer.write_u32::<LittleEndian>(self.crc32)?;
        writer.write_u32::<LittleEndian>(self.compressed_size)?;
        writer.write_u32::<LittleEndian>(self.uncompressed_size)
    }
}

/// Central Directory File Header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectoryHeader {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub disk_number_start: u16,
    pub internal_attrs: u16,
    pub external_attrs: u32,
    pub lfh_offset: u32,
    pub file_name: Vec<u8>,
    pub extra: Vec<u8>,
    pub comment: Vec<u8>,
}

impl CentralDirectoryHeader {
    /// Parse a header including its signature.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let truncated = || ZipError::truncated("truncated central directory header");

        if reader.read_u32::<LittleEndian>().map_err(truncated())? != CDFH_SIGNATURE {
            return Err(ZipError::CorruptArchive(
                "invalid central directory header signature",
            ));
        }

        let version_made_by = reader.read_u16::<LittleEndian>().map_err(truncated())?;
        let version_needed = reader.read_u16::<LittleEndian>().map_err(truncated())?;
        let flags = reader.read_u16::<LittleEndian>().map_err(truncated())?;
        let compression_method = reader.read_u16::<LittleEndian>().map_err(truncated())?;
        let last_mod_time = reader.read_u16::<LittleEndian>().map_err(truncated())?;
        let last_mod_date = reader.read_u16::<LittleEndian>().map_err(truncated())?;
        let crc32 = reader.read_u32::<LittleEndian>().map_err(truncated())?;
        let compressed_size = reader.read_u32::<LittleEndian>().map_err(truncated())?;
        let uncompressed_size = reader.read_u32::<LittleEndian>().map_err(truncated())?;
        let file_name_length = reader.read_u16::<LittleEndian>().map_err(truncated())?;
        let extra_field_length = reader.read_u16::<LittleEndian>().map_err(truncated())?;
        let file_comment_length = reader.read_u16::<LittleEndian>().map_err(truncated())?;
        let disk_number_start = reader.read_u16::<LittleEndian>().map_err(truncated())?;
        let internal_attrs = reader.read_u16::<LittleEndian>().map_err(truncated())?;
        let external_attrs = reader.read_u32::<LittleEndian>().map_err(truncated())?;
        let lfh_offset = reader.read_u32::<LittleEndian>().map_err(truncated())?;

        let mut file_name = vec![0u8; file_name_length as usize];
        reader.read_exact(&mut file_name).map_err(truncated())?;
        let mut extra = vec![0u8; extra_field_length as usize];
        reader.read_exact(&mut extra).map_err(truncated())?;
        let mut comment = vec![0u8; file_comment_length as usize];
        reader.read_exact(&mut comment).map_err(truncated())?;

        Ok(Self {
            version_made_by,
            version_needed,
            flags,
            compression_method,
            last_mod_time,
            last_mod_date,
            crc32,
            compressed_size,
            uncompressed_size,
            disk_number_start,
            internal_attrs,
            external_attrs,
            lfh_offset,
            file_name,
            extra,
            comment,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(CDFH_SIGNATURE)?;
        writer.write_u16::<LittleEndian>(self.version_made_by)?;
        writer.write_u16::<LittleEndian>(self.version_needed)?;
        writer.write_u16::<LittleEndian>(self.flags)?;
        writer.write_u16::<LittleEndian>(self.compression_method)?;
        writer.write_u16::<LittleEndian>(self.last_mod_time)?;
        writer.write_u16::<LittleEndian>(self.last_mod_date)?;
        writer.write_u32::<LittleEndian>(self.crc32)?;
        writer.write_u32::<LittleEndian>(self.compressed_size)?;
        writer.write_u32::<LittleEndian>(self.uncompressed_size)?;
        writer.write_u16::<LittleEndian>(self.file_name.len() as u16)?;
        writer.write_u16::<LittleEndian>(self.extra.len() as u16)?;
        writer.write_u16::<LittleEndian>(self.comment.len() as u16)?;
        writer.write_u16::<LittleEndian>(self.disk_number_start)?;
        writer.write_u16::<LittleEndian>(self.internal_attrs)?;
        writer.write_u32::<LittleEndian>(self.external_attrs)?;
        writer.write_u32::<LittleEndian>(self.lfh_offset)?;
        writer.write_all(&self.file_name)?;
        writer.write_all(&self.extra)?;
        writer.write_all(&self.comment)
    }

    /// Bytes this header occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        CDFH_MIN_SIZE + self.file_name.len() + self.extra.len() + self.comment.len()
    }
}

/// End of Central Directory (EOCD) - 22 bytes minimum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment: Vec<u8>,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: u32 = 0x0605_4b50;
    pub const SIZE: usize = 22;

    /// Parse a record starting at its signature; the comment is taken from
    /// the bytes that follow the fixed part.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(ZipError::CorruptArchive("truncated end of central directory"));
        }

        let mut cursor = Cursor::new(data);
        let truncated = || ZipError::truncated("truncated end of central directory");

        // Verify signature
        if cursor.read_u32::<LittleEndian>().map_err(truncated())? != Self::SIGNATURE {
            return Err(ZipError::CorruptArchive(
                "invalid end of central directory signature",
            ));
        }

        let disk_number = cursor.read_u16::<LittleEndian>().map_err(truncated())?;
        let disk_with_cd = cursor.read_u16::<LittleEndian>().map_err(truncated())?;
        let disk_entries = cursor.read_u16::<LittleEndian>().map_err(truncated())?;
        let total_entries = cursor.read_u16::<LittleEndian>().map_err(truncated())?;
        let cd_size = cursor.read_u32::<LittleEndian>().map_err(truncated())?;
        let cd_offset = cursor.read_u32::<LittleEndian>().map_err(truncated())?;
        let comment_len = cursor.read_u16::<LittleEndian>().map_err(truncated())?;

        let mut comment = vec![0u8; comment_len as usize];
        cursor
            .read_exact(&mut comment)
            .map_err(ZipError::truncated("truncated archive comment"))?;

        Ok(Self {
            disk_number,
            disk_with_cd,
            disk_entries,
            total_entries,
            cd_size,
            cd_offset,
            comment,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(Self::SIGNATURE)?;
        writer.write_u16::<LittleEndian>(self.disk_number)?;
        writer.write_u16::<LittleEndian>(self.disk_with_cd)?;
        writer.write_u16::<LittleEndian>(self.disk_entries)?;
        writer.write_u16::<LittleEndian>(self.total_entries)?;
        writer.write_u32::<LittleEndian>(self.cd_size)?;
        writer.write_u32::<LittleEndian>(self.cd_offset)?;
        writer.write_u16::<LittleEndian>(self.comment.len() as u16)?;
        writer.write_all(&self.comment)
    }
}
