//! Architecture layout planning
//!
//! [`UNetLayout::plan`] is the pure assembly algorithm: it walks the
//! configuration exactly once and records, per stage, which blocks to build
//! and at what widths. Model construction only instantiates the plan, so the
//! skip-connection bookkeeping (encoder pushes vs. decoder pops) is verified
//! here, before any weights are allocated.

use crate::config::JointUNetConfig;
use crate::error::ConfigError;
use crate::sequential::BlockKind;

/// One block of a stage, with the widths it is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockPlan {
    /// 3x3 input projection
    InputConv {
        in_channels: usize,
        out_channels: usize,
    },
    /// Time-conditioned residual block
    Residual {
        in_channels: usize,
        out_channels: usize,
    },
    /// Spatial self-attention
    SelfAttention { channels: usize },
    /// Image-to-parameter cross-modal attention
    CrossAttention { channels: usize },
    /// 2x spatial reduction
    Downsample { channels: usize },
    /// 2x spatial increase
    Upsample { channels: usize },
}

impl BlockPlan {
    /// Conditioning signals the planned block consumes
    pub fn kind(&self) -> BlockKind {
        match self {
            BlockPlan::Residual { .. } => BlockKind::TimestepConditioned,
            BlockPlan::CrossAttention { .. } => BlockKind::CrossModalConditioned,
            BlockPlan::InputConv { .. }
            | BlockPlan::SelfAttention { .. }
            | BlockPlan::Downsample { .. }
            | BlockPlan::Upsample { .. } => BlockKind::Plain,
        }
    }
}

/// An ordered run of blocks executed by one composer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    /// Blocks in execution order
    pub blocks: Vec<BlockPlan>,
    /// Channel width leaving the stage
    pub out_channels: usize,
    /// Width of the skip tensor concatenated before this stage (decoder only)
    pub skip_channels: Option<usize>,
}

/// Full per-stage layout of the encoder, bottleneck and decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UNetLayout {
    /// Expected image channels
    pub in_channels: usize,
    /// Expected parameter vector width
    pub param_dim: usize,
    /// Encoder stages; every output is pushed onto the skip stack
    pub encoder: Vec<StagePlan>,
    /// Bottleneck stage
    pub middle: StagePlan,
    /// Decoder stages; each pops one skip tensor before running
    pub decoder: Vec<StagePlan>,
    /// Skip widths in push order
    pub skip_channels: Vec<usize>,
    /// Number of 2x downsampling stages
    pub num_downsamples: usize,
}

impl UNetLayout {
    /// Plans the architecture for `config`
    ///
    /// Validates the configuration, then builds the encoder, bottleneck and
    /// decoder plans. Fails with [`ConfigError::SkipStackMismatch`] if the
    /// decoder would pop a different number of skip tensors than the encoder
    /// pushes, and with [`ConfigError::HeadsNotDivisible`] if any attention
    /// block's width does not split evenly into heads.
    pub fn plan(config: &JointUNetConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mc = config.model_channels;
        let levels = config.channel_mult.len();

        let mut encoder = vec![StagePlan {
            blocks: vec![BlockPlan::InputConv {
                in_channels: config.in_channels,
                out_channels: mc,
            }],
            out_channels: mc,
            skip_channels: None,
        }];
        let mut skip_channels = vec![mc];
        let mut ch = mc;
        let mut ds = 1;
        let mut num_downsamples = 0;

        for (level, &mult) in config.channel_mult.iter().enumerate() {
            for _ in 0..config.num_res_blocks {
                let out = mult * mc;
                let mut blocks = vec![BlockPlan::Residual {
                    in_channels: ch,
                    out_channels: out,
                }];
                ch = out;
                push_attention(&mut blocks, config, ds, ch);

                encoder.push(StagePlan {
                    blocks,
                    out_channels: ch,
                    skip_channels: None,
                });
                skip_channels.push(ch);
            }

            if level != levels - 1 {
                encoder.push(StagePlan {
                    blocks: vec![BlockPlan::Downsample { channels: ch }],
                    out_channels: ch,
                    skip_channels: None,
                });
                skip_channels.push(ch);
                ds *= 2;
                num_downsamples += 1;
            }
        }

        let mut middle_blocks = vec![
            BlockPlan::Residual {
                in_channels: ch,
                out_channels: ch,
            },
            BlockPlan::SelfAttention { channels: ch },
        ];
        if config.use_cross_attention {
            middle_blocks.push(BlockPlan::CrossAttention { channels: ch });
        }
        middle_blocks.push(BlockPlan::Residual {
            in_channels: ch,
            out_channels: ch,
        });
        let middle = StagePlan {
            blocks: middle_blocks,
            out_channels: ch,
            skip_channels: None,
        };

        let pushed = skip_channels.len();
        let mut pending = skip_channels.clone();
        let mut decoder = Vec::new();

        for (level, &mult) in config.channel_mult.iter().enumerate().rev() {
            for i in 0..=config.num_res_blocks {
                let skip = pending.pop().ok_or(ConfigError::SkipStackMismatch {
                    pushed,
                    popped: decoder.len() + 1,
                })?;
                let out = mc * mult;
                let mut blocks = vec![BlockPlan::Residual {
                    in_channels: ch + skip,
                    out_channels: out,
                }];
                ch = out;
                push_attention(&mut blocks, config, ds, ch);

                if level != 0 && i == config.num_res_blocks {
                    blocks.push(BlockPlan::Upsample { channels: ch });
                    ds /= 2;
                }

                decoder.push(StagePlan {
                    blocks,
                    out_channels: ch,
                    skip_channels: Some(skip),
                });
            }
        }

        if !pending.is_empty() {
            return Err(ConfigError::SkipStackMismatch {
                pushed,
                popped: decoder.len(),
            });
        }

        let attention_widths = encoder
            .iter()
            .chain(std::iter::once(&middle))
            .chain(decoder.iter())
            .flat_map(|stage| stage.blocks.iter())
            .filter_map(|block| match *block {
                BlockPlan::SelfAttention { channels } | BlockPlan::CrossAttention { channels } => {
                    Some(channels)
                }
                _ => None,
            });
        for channels in attention_widths {
            if channels % config.num_heads != 0 {
                return Err(ConfigError::HeadsNotDivisible {
                    channels,
                    num_heads: config.num_heads,
                });
            }
        }

        Ok(Self {
            in_channels: config.in_channels,
            param_dim: config.param_dim,
            encoder,
            middle,
            decoder,
            skip_channels,
            num_downsamples,
        })
    }

    /// Width leaving the bottleneck
    pub fn bottleneck_channels(&self) -> usize {
        self.middle.out_channels
    }

    /// Width leaving the last decoder stage, which feeds the image head
    pub fn output_channels(&self) -> usize {
        self.decoder
            .last()
            .map_or(self.middle.out_channels, |stage| stage.out_channels)
    }

    /// Image height and width must be multiples of this value
    pub fn spatial_divisor(&self) -> usize {
        1 << self.num_downsamples
    }

    /// Total number of planned cross-modal attention blocks
    pub fn num_cross_attention_blocks(&self) -> usize {
        self.encoder
            .iter()
            .chain(std::iter::once(&self.middle))
            .chain(self.decoder.iter())
            .flat_map(|stage| stage.blocks.iter())
            .filter(|block| block.kind() == BlockKind::CrossModalConditioned)
            .count()
    }
}

fn push_attention(blocks: &mut Vec<BlockPlan>, config: &JointUNetConfig, ds: usize, channels: usize) {
    if config.has_attention_at(ds) {
        blocks.push(BlockPlan::SelfAttention { channels });
        if config.use_cross_attention {
            blocks.push(BlockPlan::CrossAttention { channels });
        }
    }
}
