use sparser::io::compression::{
    CompressionCodec, FinishWrite, codec_for_name, codec_for_path, register_codec,
};
use std::io::{self, Read, Write};
use std::sync::Arc;

fn compress(codec: &dyn CompressionCodec, data: &[u8]) -> anyhow::Result<Vec<u8>> {
    let buf = tempfile::NamedTempFile::new()?;
    let mut out = codec.wrap_writer(Box::new(buf.reopen()?))?;
    out.write_all(data)?;
    out.finish()?;
    Ok(std::fs::read(buf.path())?)
}

fn decompress(codec: &dyn CompressionCodec, data: Vec<u8>) -> anyhow::Result<Vec<u8>> {
    let mut reader = codec.wrap_reader(Box::new(io::Cursor::new(data)))?;
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(any(
    feature = "compression-gzip",
    feature = "compression-deflate",
    feature = "compression-zstd",
    feature = "compression-bzip2",
    feature = "compression-xz"
))]
mod builtin_codecs {
    use super::*;

    fn check(name: &str, extension: &str) -> anyhow::Result<()> {
        let codec = codec_for_name(name)?.expect("codec is enabled");
        assert_eq!(codec.name(), name);
        assert_eq!(codec.default_extension(), extension);

        let data = b"{\"id\":1}\n{\"id\":2}\n".repeat(100);
        let packed = compress(codec.as_ref(), &data)?;
        assert_ne!(packed, data);
        assert_eq!(decompress(codec.as_ref(), packed)?, data);

        let detected = codec_for_path(format!("part-00000.txt{extension}")).expect("detected");
        assert_eq!(detected.name(), name);
        Ok(())
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn test_gzip() -> anyhow::Result<()> {
        check("gzip", ".gz")
    }

    #[cfg(feature = "compression-deflate")]
    #[test]
    fn test_deflate() -> anyhow::Result<()> {
        check("deflate", ".deflate")
    }

    #[cfg(feature = "compression-zstd")]
    #[test]
    fn test_zstd() -> anyhow::Result<()> {
        check("zstd", ".zst")
    }

    #[cfg(feature = "compression-bzip2")]
    #[test]
    fn test_bzip2() -> anyhow::Result<()> {
        check("bzip2", ".bz2")
    }

    #[cfg(feature = "compression-xz")]
    #[test]
    fn test_xz() -> anyhow::Result<()> {
        check("xz", ".xz")
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn test_concatenated_gzip_members() -> anyhow::Result<()> {
        let codec = codec_for_name("gzip")?.expect("gzip is enabled");
        let mut packed = compress(codec.as_ref(), b"first\n")?;
        packed.extend(compress(codec.as_ref(), b"second\n")?);
        assert_eq!(decompress(codec.as_ref(), packed)?, b"first\nsecond\n");
        Ok(())
    }
}

#[test]
fn test_plain_paths_have_no_codec() {
    assert!(codec_for_path("logs/part-00000.jsonl").is_none());
    assert!(codec_for_path("logs/gz/part-00000.txt").is_none());
}

/// Reverses every byte; enough to tell a custom codec apart from plain text.
struct FlipCodec;

struct FlipWriter(Box<dyn Write + Send>);

impl Write for FlipWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let flipped: Vec<u8> = buf.iter().map(|b| !b).collect();
        self.0.write_all(&flipped)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl FinishWrite for FlipWriter {
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.flush()
    }
}

struct FlipReader(Box<dyn Read + Send>);

impl Read for FlipReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.0.read(buf)?;
        buf[..n].iter_mut().for_each(|b| *b = !*b);
        Ok(n)
    }
}

impl CompressionCodec for FlipCodec {
    fn name(&self) -> &str {
        "flip"
    }

    fn extensions(&self) -> &[&str] {
        &[".flip"]
    }

    fn wrap_reader(&self, reader: Box<dyn Read + Send>) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(FlipReader(reader)))
    }

    fn wrap_writer(&self, writer: Box<dyn Write + Send>) -> io::Result<Box<dyn FinishWrite>> {
        Ok(Box::new(FlipWriter(writer)))
    }
}

#[test]
fn test_registered_codec_takes_part_in_lookups() -> anyhow::Result<()> {
    register_codec(Arc::new(FlipCodec));

    let codec = codec_for_name("FLIP")?.expect("registered");
    assert_eq!(codec.default_extension(), ".flip");
    assert_eq!(codec_for_path("a/b.txt.flip").expect("detected").name(), "flip");

    let packed = compress(codec.as_ref(), b"line\n")?;
    assert_eq!(packed, b"line\n".iter().map(|b| !b).collect::<Vec<_>>());
    assert_eq!(decompress(codec.as_ref(), packed)?, b"line\n");
    Ok(())
}
