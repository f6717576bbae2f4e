//! Two-stage reassembly: blocks into planes, planes into images.
//!
//! Both stages are driven by a grouped reduce whose values can arrive
//! in any order and be combined in any grouping. Each stage therefore
//! works on a two-case partial value:
//!
//! - [`BlockPartial`]: a single raw block, or a plane with some blocks
//!   already written in.
//! - [`ChannelPartial`]: a single reassembled channel, or a composite
//!   holding restored planes by channel slot.
//!
//! Every pair of cases has exactly one merge rule, and each rule is
//! symmetric, so the merge functions are commutative. Blocks cover
//! disjoint regions and channels occupy disjoint slots, which makes
//! them associative as well.

use image::{GrayImage, Luma, RgbImage};

use crate::blocks::TransformedBlock;
use crate::color;
use crate::resample::{self, ResampleFilter};
use crate::transform::LEVEL_SHIFT;
use crate::types::{ChannelIndex, Dimensions, PipelineError, Plane};

// ───────────────────────── Stage 5: blocks ──────────────────────────

/// Partial result of merging the blocks of one (image, channel) group.
#[derive(Debug, Clone)]
pub enum BlockPartial {
    /// A single block that has not met another one yet.
    Block(TransformedBlock),
    /// A zero-initialized plane with one or more blocks written in.
    Plane(Plane),
}

impl From<TransformedBlock> for BlockPartial {
    fn from(block: TransformedBlock) -> Self {
        Self::Block(block)
    }
}

impl BlockPartial {
    /// Combine two partials of the same group.
    ///
    /// Two planes are summed element-wise; since every block region is
    /// written exactly once and the rest of each plane is zero, the sum
    /// equals writing all blocks in sequence.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        match (self, other) {
            (Self::Plane(mut acc), Self::Plane(other)) => {
                debug_assert_eq!(acc.dimensions(), other.dimensions());
                for (sample, addend) in acc.iter_mut().zip(other.iter()) {
                    *sample += *addend;
                }
                Self::Plane(acc)
            }
            (Self::Plane(mut acc), Self::Block(block))
            | (Self::Block(block), Self::Plane(mut acc)) => {
                block.write_into(&mut acc);
                Self::Plane(acc)
            }
            (Self::Block(a), Self::Block(b)) => {
                let mut acc = a.plane.zeros();
                a.write_into(&mut acc);
                b.write_into(&mut acc);
                Self::Plane(acc)
            }
        }
    }

    /// Finish the group, turning a lone block into a plane as well.
    #[must_use]
    pub fn into_plane(self) -> Plane {
        match self {
            Self::Plane(plane) => plane,
            Self::Block(block) => {
                let mut plane = block.plane.zeros();
                block.write_into(&mut plane);
                plane
            }
        }
    }
}

// ───────────────────────── Stage 6: channels ────────────────────────

/// One fully reassembled channel plane, still in the shifted domain.
#[derive(Debug, Clone)]
pub struct ReassembledChannel {
    /// Size of the image the channel belongs to.
    pub image: Dimensions,
    /// Which channel this is.
    pub channel: ChannelIndex,
    /// The merged plane (possibly smaller than `image` for subsampled
    /// chroma).
    pub plane: Plane,
}

impl ReassembledChannel {
    /// Undo the level shift, clamp to `[0, 255]`, resize to the image
    /// size if needed and round to 8 bits.
    #[must_use]
    pub fn restore(&self, filter: ResampleFilter) -> GrayImage {
        let mut unshifted = self.plane.clone();
        for sample in unshifted.iter_mut() {
            *sample = (*sample + LEVEL_SHIFT).clamp(0.0, 255.0);
        }
        let Dimensions { width, height } = self.image;
        let resized = resample::resize_plane(&unshifted, width, height, filter);
        GrayImage::from_fn(width, height, |x, y| {
            Luma([color::to_u8(resized.get_pixel(x, y).0[0])])
        })
    }
}

/// Restored 8-bit planes of one image, indexed by channel.
#[derive(Debug, Clone)]
pub struct Composite {
    image: Dimensions,
    planes: [Option<GrayImage>; 3],
}

impl Composite {
    /// An empty composite for an image of the given size.
    #[must_use]
    pub const fn new(image: Dimensions) -> Self {
        Self {
            image,
            planes: [None, None, None],
        }
    }

    /// The restored plane for `channel`, if it has arrived.
    #[must_use]
    pub fn plane(&self, channel: ChannelIndex) -> Option<&GrayImage> {
        self.planes[channel.index()].as_ref()
    }

    /// Number of channels present.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.planes.iter().filter(|p| p.is_some()).count()
    }

    /// Restore `channel` and place it in its slot.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DuplicateChannel`] if the slot is taken.
    pub fn insert(
        mut self,
        channel: &ReassembledChannel,
        filter: ResampleFilter,
    ) -> Result<Self, PipelineError> {
        let slot = &mut self.planes[channel.channel.index()];
        if slot.is_some() {
            return Err(PipelineError::DuplicateChannel {
                channel: channel.channel,
            });
        }
        *slot = Some(channel.restore(filter));
        Ok(self)
    }

    /// Combine the slots of two composites of the same image.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DuplicateChannel`] if both hold the same
    /// channel.
    pub fn union(self, other: Self) -> Result<Self, PipelineError> {
        let Self { image, planes } = self;
        let mut merged = Self::new(image);
        for ((channel, a), b) in ChannelIndex::ALL.into_iter().zip(planes).zip(other.planes) {
            merged.planes[channel.index()] = match (a, b) {
                (Some(_), Some(_)) => return Err(PipelineError::DuplicateChannel { channel }),
                (Some(plane), None) | (None, Some(plane)) => Some(plane),
                (None, None) => None,
            };
        }
        Ok(merged)
    }

    /// Interleave the three planes and convert back to RGB.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingChannel`] unless all three
    /// channels are present.
    pub fn into_image(self) -> Result<RgbImage, PipelineError> {
        let present = self.channel_count();
        match self.planes {
            [Some(luma), Some(chroma_red), Some(chroma_blue)] => {
                Ok(color::to_rgb(&luma, &chroma_red, &chroma_blue))
            }
            _ => Err(PipelineError::MissingChannel { present }),
        }
    }
}

/// Partial result of merging the channels of one image.
#[derive(Debug, Clone)]
pub enum ChannelPartial {
    /// A single channel, not yet restored.
    Channel(ReassembledChannel),
    /// Restored channels collected so far.
    Composite(Composite),
}

impl From<ReassembledChannel> for ChannelPartial {
    fn from(channel: ReassembledChannel) -> Self {
        Self::Channel(channel)
    }
}

impl ChannelPartial {
    /// Combine two partials of the same image, in either order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DuplicateChannel`] if both sides carry
    /// the same channel.
    pub fn merge(self, other: Self, filter: ResampleFilter) -> Result<Self, PipelineError> {
        let composite = match (self, other) {
            (Self::Channel(a), Self::Channel(b)) => {
                if a.channel == b.channel {
                    return Err(PipelineError::DuplicateChannel { channel: a.channel });
                }
                Composite::new(a.image)
                    .insert(&a, filter)?
                    .insert(&b, filter)?
            }
            (Self::Composite(acc), Self::Channel(channel))
            | (Self::Channel(channel), Self::Composite(acc)) => acc.insert(&channel, filter)?,
            (Self::Composite(a), Self::Composite(b)) => a.union(b)?,
        };
        Ok(Self::Composite(composite))
    }

    /// Finish the group into an RGB image.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingChannel`] unless all three
    /// channels were merged.
    pub fn into_image(self) -> Result<RgbImage, PipelineError> {
        match self {
            Self::Channel(_) => Err(PipelineError::MissingChannel { present: 1 }),
            Self::Composite(composite) => composite.into_image(),
        }
    }
}
