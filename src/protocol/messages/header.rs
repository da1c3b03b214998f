use std::io::{Read, Write};

use crate::protocol::{
    api_key::ApiKey,
    api_version::ApiVersion,
    primitives::{ReadError, ReadType, WriteError, WriteType},
};

/// Common request header.
///
/// Always encoded at header version 1 (`client_id` present, no tagged
/// fields), which every broker since 0.9 accepts for the non-flexible message
/// versions carried by this crate.
#[derive(Debug, PartialEq, Eq)]
pub struct RequestHeader {
    /// The API key of this request.
    pub api_key: ApiKey,

    /// The API version of this request.
    pub api_version: ApiVersion,

    /// The correlation ID of this request.
    pub correlation_id: i32,

    /// The client ID string.
    pub client_id: Option<String>,
}

impl RequestHeader {
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), WriteError> {
        i16::from(self.api_key).write(writer)?;
        self.api_version.0.write(writer)?;
        self.correlation_id.write(writer)?;
        self.client_id.write(writer)?;
        Ok(())
    }

    pub fn read<R: Read>(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            api_key: ApiKey::from(i16::read(reader)?),
            api_version: ApiVersion(i16::read(reader)?),
            correlation_id: i32::read(reader)?,
            client_id: Option::<String>::read(reader)?,
        })
    }
}

/// Common response header (version 0: just the correlation ID).
#[derive(Debug, PartialEq, Eq)]
pub struct ResponseHeader {
    /// The correlation ID of this response.
    pub correlation_id: i32,
}

impl ResponseHeader {
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            correlation_id: i32::read(reader)?,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), WriteError> {
        self.correlation_id.write(writer)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_request_header_roundtrip() {
        let header = RequestHeader {
            api_key: ApiKey::Metadata,
            api_version: ApiVersion(1),
            correlation_id: 42,
            client_id: Some("test-client".to_owned()),
        };
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        let got = RequestHeader::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(header, got);
    }
}
