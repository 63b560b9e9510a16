// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Two subcommands: `train` and `preview`. Both share the data
// and preprocessing flags in DataArgs.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};

use crate::application::train_use_case::TrainConfig;
use crate::domain::mode::AttentionMode;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pretrain CXR-BERT with masked language modelling and image-text matching
    Train(TrainArgs),

    /// Print assembled samples as JSON without training
    Preview(PreviewArgs),
}

/// Dataset, vocabulary and preprocessing flags.
#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// JSONL file with one {img, text, label} record per line
    #[arg(long, default_value = "data/train.jsonl")]
    pub data_path: String,

    /// Directory that relative image paths are resolved against
    #[arg(long)]
    pub image_root: Option<String>,

    /// tokenizer.json, vocab.txt, or a directory containing one of them
    #[arg(long, default_value = "data/vocab")]
    pub vocab_path: String,

    /// Text backbone: bert-base-uncased, ClinicalBERT, bert_small, albert-base-v2
    #[arg(long, default_value = "bert-base-uncased")]
    pub bert_model: String,

    /// Maximum number of report tokens
    #[arg(long, default_value_t = 253)]
    pub seq_len: usize,

    /// Number of image patch embeddings per sample
    #[arg(long, default_value_t = 100)]
    pub num_image_embeds: usize,

    /// Side length X-rays are resized to
    #[arg(long, default_value_t = 512)]
    pub image_size: usize,

    /// Probability of the seq-to-seq attention mask
    #[arg(long, default_value_t = 0.0)]
    pub s2s_prob: f64,

    /// Probability of the bidirectional attention mask
    #[arg(long, default_value_t = 1.0)]
    pub bi_prob: f64,

    /// Emit a 1-D key mask for bidirectional samples
    #[arg(long)]
    pub attn_1d: bool,

    /// Use segment ids 4/5 instead of 0/1
    #[arg(long)]
    pub new_segment_ids: bool,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Directory for checkpoints, configs and metrics.csv
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, default_value_t = 512)]
    pub hidden_size: usize,

    /// hidden_size must be divisible by num_heads
    #[arg(long, default_value_t = 8)]
    pub num_heads: usize,

    #[arg(long, default_value_t = 4)]
    pub num_layers: usize,

    #[arg(long, default_value_t = 2048)]
    pub intermediate_size: usize,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    /// Width of each image patch feature
    #[arg(long, default_value_t = 2048)]
    pub img_hidden_sz: usize,

    #[arg(long, default_value_t = 32)]
    pub patch_size: usize,

    /// Disable position embeddings for image patches
    #[arg(long)]
    pub no_img_position: bool,

    /// Disable the masked language modelling head
    #[arg(long)]
    pub no_mlm: bool,

    /// Disable the image-text matching head
    #[arg(long)]
    pub no_itm: bool,

    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,

    #[arg(long, default_value_t = 0.0)]
    pub weight_decay: f32,

    /// Gradient-norm clip; 0 disables clipping
    #[arg(long, default_value_t = 1.0)]
    pub max_grad_norm: f32,

    /// Fraction of records held out for validation
    #[arg(long, default_value_t = 0.1)]
    pub val_fraction: f64,

    #[arg(long, default_value_t = 1)]
    pub num_workers: usize,

    /// Log the running loss every N steps (0 = never)
    #[arg(long, default_value_t = 100)]
    pub log_every: usize,
}

#[derive(Args, Debug)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Force every sample into one mode (s2s or bi)
    #[arg(long)]
    pub mode: Option<AttentionMode>,

    /// Number of samples to print
    #[arg(long, default_value_t = 3)]
    pub count: usize,

    /// Include the attention mask in the output
    #[arg(long)]
    pub show_mask: bool,
}

impl DataArgs {
    /// Fill the data section of a TrainConfig; the rest keeps `base`.
    pub fn apply(self, base: TrainConfig) -> TrainConfig {
        TrainConfig {
            data_path:        self.data_path,
            image_root:       self.image_root,
            vocab_path:       self.vocab_path,
            bert_model:       self.bert_model,
            seq_len:          self.seq_len,
            num_image_embeds: self.num_image_embeds,
            image_size:       self.image_size,
            s2s_prob:         self.s2s_prob,
            bi_prob:          self.bi_prob,
            attn_1d:          self.attn_1d,
            new_segment_ids:  self.new_segment_ids,
            seed:             self.seed,
            ..base
        }
    }
}

/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        let base = TrainConfig {
            checkpoint_dir:    a.checkpoint_dir,
            hidden_size:       a.hidden_size,
            num_heads:         a.num_heads,
            num_layers:        a.num_layers,
            intermediate_size: a.intermediate_size,
            dropout:           a.dropout,
            img_hidden_sz:     a.img_hidden_sz,
            patch_size:        a.patch_size,
            img_position:      !a.no_img_position,
            mlm_task:          !a.no_mlm,
            itm_task:          !a.no_itm,
            batch_size:        a.batch_size,
            epochs:            a.epochs,
            lr:                a.lr,
            weight_decay:      a.weight_decay,
            max_grad_norm:     a.max_grad_norm,
            val_fraction:      a.val_fraction,
            num_workers:       a.num_workers,
            log_every:         a.log_every,
            ..TrainConfig::default()
        };
        a.data.apply(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_train_flags_reach_config() {
        let cli = Cli::try_parse_from([
            "cxr-bert", "train",
            "--data-path", "d.jsonl",
            "--seq-len", "64",
            "--s2s-prob", "0.5", "--bi-prob", "0.5",
            "--no-itm",
        ])
        .unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg: TrainConfig = args.into();
        assert_eq!(cfg.data_path, "d.jsonl");
        assert_eq!(cfg.seq_len, 64);
        assert_eq!(cfg.s2s_prob, 0.5);
        assert!(cfg.mlm_task);
        assert!(!cfg.itm_task);
        assert!(cfg.img_position);
    }

    #[test]
    fn test_preview_mode_parses() {
        let cli = Cli::try_parse_from(["cxr-bert", "preview", "--mode", "s2s"]).unwrap();
        let Commands::Preview(args) = cli.command else { panic!("expected preview") };
        assert_eq!(args.mode, Some(AttentionMode::Seq2Seq));
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!(Cli::try_parse_from(["cxr-bert", "preview", "--mode", "img2txt"]).is_err());
    }
}
