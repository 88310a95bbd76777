//! This crate provides access to the pixel data of a DICOM object:
//! frame extraction for native and encapsulated layouts,
//! a pluggable frame codec boundary,
//! and grayscale rendering through the window/level pipeline.

pub mod lut;

pub use crate::lut::{Rescale, WindowLevel};

use radlink_core::value::Value;
use radlink_core::{tags, Tag};
use radlink_encoding::transfer_syntax::{Codec, TransferSyntax};
use radlink_object::InMemObject;
use snafu::{ensure, Backtrace, OptionExt, Snafu};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("object has no attribute {}", tag))]
    MissingAttribute { tag: Tag, backtrace: Backtrace },

    #[snafu(display("attribute {} has an unusable value", tag))]
    UnusableAttribute { tag: Tag, backtrace: Backtrace },

    #[snafu(display("unsupported bits allocated: {}", bits))]
    UnsupportedBitsAllocated { bits: u16, backtrace: Backtrace },

    #[snafu(display("frame index {} out of range ({} frames)", index, frames))]
    FrameOutOfRange {
        index: u32,
        frames: u32,
        backtrace: Backtrace,
    },

    #[snafu(display("no pixel data codec registered for `{}`", name))]
    NoCodec { name: String, backtrace: Backtrace },

    #[snafu(display("pixel data codec `{}` failed: {}", name, message))]
    CodecFailure {
        name: String,
        message: String,
        backtrace: Backtrace,
    },

    #[snafu(display("pixel data is shorter than one frame"))]
    ShortPixelData { backtrace: Backtrace },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The image attributes which govern pixel data interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePixelAttributes {
    pub rows: u16,
    pub columns: u16,
    pub samples_per_pixel: u16,
    pub bits_allocated: u16,
    pub bits_stored: u16,
    pub high_bit: u16,
    pub pixel_representation: u16,
    pub photometric_interpretation: String,
    pub number_of_frames: u32,
    pub rescale: Rescale,
    pub window: Option<WindowLevel>,
}

impl ImagePixelAttributes {
    /// Gather the image pixel module attributes from a data set.
    pub fn from_object(obj: &InMemObject) -> Result<Self> {
        fn required_u16(obj: &InMemObject, tag: Tag) -> Result<u16> {
            obj.get(tag)
                .context(MissingAttributeSnafu { tag })?
                .to_int()
                .ok()
                .context(UnusableAttributeSnafu { tag })
        }
        fn optional_f64(obj: &InMemObject, tag: Tag) -> Option<f64> {
            obj.get(tag).and_then(|e| e.value().to_float64().ok())
        }

        let rows = required_u16(obj, tags::ROWS)?;
        let columns = required_u16(obj, tags::COLUMNS)?;
        let bits_allocated = required_u16(obj, tags::BITS_ALLOCATED)?;
        ensure!(
            bits_allocated == 8 || bits_allocated == 16,
            UnsupportedBitsAllocatedSnafu {
                bits: bits_allocated
            }
        );
        let bits_stored = required_u16(obj, tags::BITS_STORED).unwrap_or(bits_allocated);
        let high_bit = required_u16(obj, tags::HIGH_BIT).unwrap_or(bits_stored - 1);
        let samples_per_pixel = required_u16(obj, tags::SAMPLES_PER_PIXEL).unwrap_or(1);
        let pixel_representation = required_u16(obj, tags::PIXEL_REPRESENTATION).unwrap_or(0);
        let photometric_interpretation = obj
            .get(tags::PHOTOMETRIC_INTERPRETATION)
            .and_then(|e| e.to_str().ok())
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| "MONOCHROME2".to_string());
        let number_of_frames = obj
            .get(tags::NUMBER_OF_FRAMES)
            .and_then(|e| e.to_int::<u32>().ok())
            .unwrap_or(1);

        let rescale = Rescale {
            slope: optional_f64(obj, tags::RESCALE_SLOPE).unwrap_or(1.0),
            intercept: optional_f64(obj, tags::RESCALE_INTERCEPT).unwrap_or(0.0),
        };
        let window = match (
            optional_f64(obj, tags::WINDOW_CENTER),
            optional_f64(obj, tags::WINDOW_WIDTH),
        ) {
            (Some(center), Some(width)) => Some(WindowLevel {
                center,
                width,
                invert: false,
            }),
            _ => None,
        };

        Ok(ImagePixelAttributes {
            rows,
            columns,
            samples_per_pixel,
            bits_allocated,
            bits_stored,
            high_bit,
            pixel_representation,
            photometric_interpretation,
            number_of_frames,
            rescale,
            window,
        })
    }

    /// The byte size of a single decoded frame.
    pub fn frame_byte_size(&self) -> usize {
        usize::from(self.rows)
            * usize::from(self.columns)
            * usize::from(self.samples_per_pixel)
            * usize::from(self.bits_allocated / 8)
    }

    /// Whether the photometric interpretation displays
    /// the minimum sample value as white.
    pub fn is_monochrome1(&self) -> bool {
        self.photometric_interpretation.eq_ignore_ascii_case("MONOCHROME1")
    }
}

/// A decoder for the frames of one encapsulated pixel data layout.
///
/// Implementations wrap a compression scheme (JPEG family, RLE, ...)
/// and are registered under the codec name carried by the
/// transfer syntax descriptor.
pub trait PixelCodec {
    /// The name under which this codec registers.
    fn name(&self) -> &'static str;

    /// Decode a single frame from the encapsulated fragments
    /// into native bytes (rows x columns x samples, LE sample order).
    fn decode_frame(
        &self,
        fragments: &[Vec<u8>],
        frame: u32,
        attrs: &ImagePixelAttributes,
    ) -> Result<Vec<u8>>;
}

/// A registry mapping codec names to frame decoders.
///
/// The registry starts empty: native pixel data needs no codec,
/// and encapsulated layouts raise [`Error::NoCodec`]
/// until a codec is registered for them.
#[derive(Default, Clone)]
pub struct PixelCodecRegistry {
    codecs: HashMap<&'static str, Arc<dyn PixelCodec + Send + Sync>>,
}

impl std::fmt::Debug for PixelCodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelCodecRegistry")
            .field("codecs", &self.codecs.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PixelCodecRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a codec under its own name,
    /// replacing any codec previously registered under that name.
    pub fn register(&mut self, codec: Arc<dyn PixelCodec + Send + Sync>) {
        self.codecs.insert(codec.name(), codec);
    }

    /// Fetch the codec with the given name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn PixelCodec + Send + Sync>> {
        self.codecs.get(name)
    }
}

/// The pixel payload of an object, either native or encapsulated.
#[derive(Debug, Clone)]
enum PixelPayload {
    Native(Vec<u8>),
    Encapsulated {
        fragments: Vec<Vec<u8>>,
        codec: &'static str,
    },
}

/// Frame-level access to the pixel data of a DICOM object.
#[derive(Debug, Clone)]
pub struct PixelDataSource {
    attrs: ImagePixelAttributes,
    payload: PixelPayload,
    registry: PixelCodecRegistry,
}

impl PixelDataSource {
    /// Build a pixel data source from a data set
    /// under the given transfer syntax.
    pub fn from_object(
        obj: &InMemObject,
        ts: &TransferSyntax,
        registry: PixelCodecRegistry,
    ) -> Result<Self> {
        let attrs = ImagePixelAttributes::from_object(obj)?;
        let element = obj.get(tags::PIXEL_DATA).context(MissingAttributeSnafu {
            tag: tags::PIXEL_DATA,
        })?;

        let payload = match element.value() {
            Value::PixelSequence { fragments, .. } => {
                let codec = match ts.codec {
                    Codec::Encapsulated(name) => name,
                    // an encapsulated layout under a native syntax is
                    // malformed, but the fragments are still recoverable
                    _ => {
                        tracing::warn!(
                            "encapsulated pixel data under native transfer syntax {}",
                            ts.uid
                        );
                        "identity"
                    }
                };
                PixelPayload::Encapsulated {
                    fragments: fragments.to_vec(),
                    codec,
                }
            }
            value => {
                let bytes = value
                    .to_bytes()
                    .ok()
                    .context(UnusableAttributeSnafu {
                        tag: tags::PIXEL_DATA,
                    })?
                    .into_owned();
                PixelPayload::Native(bytes)
            }
        };

        Ok(PixelDataSource {
            attrs,
            payload,
            registry,
        })
    }

    /// The image attributes of this pixel data.
    pub fn attributes(&self) -> &ImagePixelAttributes {
        &self.attrs
    }

    /// The number of frames of this pixel data.
    pub fn number_of_frames(&self) -> u32 {
        match &self.payload {
            PixelPayload::Native(_) => self.attrs.number_of_frames,
            PixelPayload::Encapsulated { fragments, .. } => {
                // one fragment per frame is the common layout;
                // the declared frame count wins when present
                self.attrs.number_of_frames.max(fragments.len() as u32)
            }
        }
    }

    /// Retrieve the native bytes of a single frame.
    pub fn frame(&self, index: u32) -> Result<Vec<u8>> {
        let frames = self.number_of_frames();
        ensure!(index < frames, FrameOutOfRangeSnafu { index, frames });

        match &self.payload {
            PixelPayload::Native(data) => {
                let size = self.attrs.frame_byte_size();
                let start = size * index as usize;
                let end = start + size;
                ensure!(end <= data.len(), ShortPixelDataSnafu);
                Ok(data[start..end].to_vec())
            }
            PixelPayload::Encapsulated { fragments, codec } => {
                let decoder = self
                    .registry
                    .get(codec)
                    .context(NoCodecSnafu { name: *codec })?;
                decoder.decode_frame(fragments, index, &self.attrs)
            }
        }
    }

    /// Render a frame to 8-bit samples through the
    /// modality LUT, VOI LUT and presentation LUT pipeline.
    ///
    /// Grayscale images produce one byte per pixel;
    /// color images (3 samples per pixel) are passed through
    /// without windowing.
    pub fn rendered(&self, index: u32, window: Option<WindowLevel>) -> Result<Vec<u8>> {
        let data = self.frame(index)?;
        let attrs = &self.attrs;

        if attrs.samples_per_pixel == 3 {
            return Ok(data);
        }

        let window = window
            .or(attrs.window)
            .unwrap_or_else(|| WindowLevel::full_range(attrs.bits_stored));
        let monochrome1 = attrs.is_monochrome1();
        let signed = attrs.pixel_representation == 1;

        let out = match attrs.bits_allocated {
            8 => data
                .iter()
                .map(|&b| {
                    let stored = if signed { f64::from(b as i8) } else { f64::from(b) };
                    lut::render_sample(stored, attrs.rescale, &window, monochrome1)
                })
                .collect(),
            16 => data
                .chunks_exact(2)
                .map(|c| {
                    let raw = u16::from_le_bytes([c[0], c[1]]);
                    let stored = if signed {
                        f64::from(raw as i16)
                    } else {
                        f64::from(raw)
                    };
                    lut::render_sample(stored, attrs.rescale, &window, monochrome1)
                })
                .collect(),
            bits => return UnsupportedBitsAllocatedSnafu { bits }.fail(),
        };
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radlink_core::value::{Value, C};
    use radlink_core::{DataElement, VR};
    use radlink_encoding::transfer_syntax::entries;

    fn gray_object(pixels: Vec<u8>, rows: u16, columns: u16) -> InMemObject {
        let mut obj = InMemObject::new();
        obj.set_int(tags::ROWS, i64::from(rows)).unwrap();
        obj.set_int(tags::COLUMNS, i64::from(columns)).unwrap();
        obj.set_int(tags::BITS_ALLOCATED, 8).unwrap();
        obj.set_int(tags::BITS_STORED, 8).unwrap();
        obj.set_int(tags::HIGH_BIT, 7).unwrap();
        obj.set_int(tags::SAMPLES_PER_PIXEL, 1).unwrap();
        obj.set_int(tags::PIXEL_REPRESENTATION, 0).unwrap();
        obj.set_string(tags::PHOTOMETRIC_INTERPRETATION, "MONOCHROME2")
            .unwrap();
        obj.set_bytes(tags::PIXEL_DATA, pixels).unwrap();
        obj
    }

    #[test]
    fn native_frame_access() {
        let obj = gray_object(vec![0, 64, 128, 255], 2, 2);
        let src = PixelDataSource::from_object(
            &obj,
            &entries::EXPLICIT_VR_LITTLE_ENDIAN,
            PixelCodecRegistry::new(),
        )
        .unwrap();
        assert_eq!(src.number_of_frames(), 1);
        assert_eq!(src.frame(0).unwrap(), vec![0, 64, 128, 255]);
        assert!(matches!(
            src.frame(1),
            Err(Error::FrameOutOfRange { .. })
        ));
    }

    #[test]
    fn rendered_full_range_is_identity_for_8_bit() {
        let obj = gray_object(vec![0, 128, 255, 32], 2, 2);
        let src = PixelDataSource::from_object(
            &obj,
            &entries::EXPLICIT_VR_LITTLE_ENDIAN,
            PixelCodecRegistry::new(),
        )
        .unwrap();
        let out = src.rendered(0, None).unwrap();
        assert_eq!(out, vec![0, 128, 255, 32]);
    }

    #[test]
    fn rendered_honors_invert() {
        let obj = gray_object(vec![0, 255], 1, 2);
        let src = PixelDataSource::from_object(
            &obj,
            &entries::EXPLICIT_VR_LITTLE_ENDIAN,
            PixelCodecRegistry::new(),
        )
        .unwrap();
        let mut window = WindowLevel::full_range(8);
        window.invert = true;
        let out = src.rendered(0, Some(window)).unwrap();
        assert_eq!(out, vec![255, 0]);
    }

    #[test]
    fn encapsulated_without_codec_is_an_error() {
        let mut obj = gray_object(vec![0], 1, 1);
        let fragments: C<Vec<u8>> = C::from(vec![vec![0xAA, 0xBB]]);
        obj.put(DataElement::new(
            tags::PIXEL_DATA,
            VR::OB,
            Value::new_pixel_sequence(C::new(), fragments),
        ));
        let src = PixelDataSource::from_object(
            &obj,
            &entries::JPEG_BASELINE_8_BIT,
            PixelCodecRegistry::new(),
        )
        .unwrap();
        assert!(matches!(src.frame(0), Err(Error::NoCodec { .. })));
    }

    struct RawCodec;
    impl PixelCodec for RawCodec {
        fn name(&self) -> &'static str {
            "jpeg"
        }
        fn decode_frame(
            &self,
            fragments: &[Vec<u8>],
            frame: u32,
            _attrs: &ImagePixelAttributes,
        ) -> Result<Vec<u8>> {
            Ok(fragments[frame as usize].clone())
        }
    }

    #[test]
    fn registered_codec_decodes_fragments() {
        let mut obj = gray_object(vec![0, 0], 1, 2);
        let fragments: C<Vec<u8>> = C::from(vec![vec![0x11, 0x22]]);
        obj.put(DataElement::new(
            tags::PIXEL_DATA,
            VR::OB,
            Value::new_pixel_sequence(C::new(), fragments),
        ));
        let mut registry = PixelCodecRegistry::new();
        registry.register(Arc::new(RawCodec));
        let src = PixelDataSource::from_object(
            &obj,
            &entries::JPEG_BASELINE_8_BIT,
            registry,
        )
        .unwrap();
        assert_eq!(src.frame(0).unwrap(), vec![0x11, 0x22]);
    }
}
