use std::path::Path;

use tokenizers::decoders::DecoderWrapper;
use tokenizers::models::bpe::BPE;
use tokenizers::models::wordlevel::WordLevel;
use tokenizers::models::ModelWrapper;
use tokenizers::normalizers::NormalizerWrapper;
use tokenizers::pre_tokenizers::byte_level::ByteLevel;
use tokenizers::pre_tokenizers::sequence::Sequence;
use tokenizers::pre_tokenizers::split::{Split, SplitPattern};
use tokenizers::pre_tokenizers::whitespace::WhitespaceSplit;
use tokenizers::pre_tokenizers::PreTokenizerWrapper;
use tokenizers::processors::roberta::RobertaProcessing;
use tokenizers::processors::template::TemplateProcessing;
use tokenizers::processors::PostProcessorWrapper;
use tokenizers::{Model, SplitDelimiterBehavior, Tokenizer, TokenizerBuilder, TruncationParams};

use crate::{RegressorError, Result};

/// Text -> token ids with special tokens added and truncation applied. Padding is the
/// collator's job.
pub trait TextTokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<u32>>;
    fn pad_id(&self) -> u32;
}

type Builder = TokenizerBuilder<ModelWrapper, NormalizerWrapper, PreTokenizerWrapper, PostProcessorWrapper, DecoderWrapper>;

fn tok_err(e: impl std::fmt::Display) -> RegressorError {
    RegressorError::Tokenizer(e.to_string())
}

/// ESM vocabulary tokenizer: one token per residue, wrapped in `<cls>` ... `<eos>`.
///
/// A word-level model over `vocab.txt` behind a whitespace split and a per-character split,
/// so `"MLK"` becomes `<cls> M L K <eos>`.
pub struct EsmTokenizer {
    inner: HfTokenizer,
}

impl EsmTokenizer {
    /// `vocab.txt` has one token per line; the line number is the id.
    pub fn from_vocab_file(path: &Path, max_len: usize) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RegressorError::Io(format!("{}: {e}", path.display())))?;
        let tokens: Vec<&str> = text.lines().map(str::trim).collect();
        Self::from_tokens(&tokens, max_len)
    }

    pub fn from_tokens(tokens: &[&str], max_len: usize) -> Result<Self> {
        if max_len < 3 {
            return Err(RegressorError::Config(format!("max_len {max_len} leaves no room for residues")));
        }
        let special = |name: &str| {
            tokens
                .iter()
                .position(|t| *t == name)
                .map(|i| i as u32)
                .ok_or_else(|| RegressorError::Tokenizer(format!("vocab has no {name} token")))
        };
        let cls = special("<cls>")?;
        let eos = special("<eos>")?;
        special("<pad>")?;
        special("<unk>")?;

        let model = WordLevel::builder()
            .vocab(tokens.iter().enumerate().map(|(i, t)| (t.to_string(), i as u32)).collect())
            .unk_token("<unk>".to_string())
            .build()
            .map_err(tok_err)?;

        let residues = Split::new(SplitPattern::Regex(".".to_string()), SplitDelimiterBehavior::Isolated, false)
            .map_err(tok_err)?;
        let pre = Sequence::new(vec![WhitespaceSplit.into(), residues.into()]);

        let template = TemplateProcessing::builder()
            .try_single("<cls> $A <eos>")
            .map_err(tok_err)?
            .special_tokens(vec![("<cls>", cls), ("<eos>", eos)])
            .build()
            .map_err(tok_err)?;

        let built = Builder::new()
            .with_model(model.into())
            .with_pre_tokenizer(Some(pre.into()))
            .with_post_processor(Some(template.into()))
            .build()
            .map_err(tok_err)?;

        Ok(Self { inner: HfTokenizer::with_limits(Tokenizer::from(built), max_len)? })
    }
}

impl TextTokenizer for EsmTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        self.inner.encode(text)
    }

    fn pad_id(&self) -> u32 {
        self.inner.pad_id()
    }
}

/// Wrapper over a Hugging Face `tokenizers` tokenizer (used for the SMILES model).
pub struct HfTokenizer {
    inner: Tokenizer,
    pad: u32,
}

impl HfTokenizer {
    pub fn from_file(path: &Path, max_len: usize) -> Result<Self> {
        let inner = Tokenizer::from_file(path)
            .map_err(|e| RegressorError::Tokenizer(format!("{}: {e}", path.display())))?;
        Self::with_limits(inner, max_len)
    }

    /// Byte-level BPE with RoBERTa post-processing, for repos that only ship
    /// `vocab.json` + `merges.txt`.
    pub fn from_bpe_files(vocab: &Path, merges: &Path, max_len: usize) -> Result<Self> {
        let bpe = BPE::from_file(&vocab.to_string_lossy(), &merges.to_string_lossy())
            .build()
            .map_err(tok_err)?;

        let bos = bpe.token_to_id("<s>").unwrap_or(0);
        let eos = bpe.token_to_id("</s>").unwrap_or(2);

        // RoBERTa tokenizers do not prepend a space unless asked to
        let built = Builder::new()
            .with_model(bpe.into())
            .with_pre_tokenizer(Some(ByteLevel::default().add_prefix_space(false).into()))
            .with_post_processor(Some(
                RobertaProcessing::new(("</s>".to_string(), eos), ("<s>".to_string(), bos))
                    .add_prefix_space(false)
                    .into(),
            ))
            .with_decoder(Some(ByteLevel::default().add_prefix_space(false).into()))
            .build()
            .map_err(tok_err)?;

        Self::with_limits(Tokenizer::from(built), max_len)
    }

    fn with_limits(mut inner: Tokenizer, max_len: usize) -> Result<Self> {
        inner
            .with_truncation(Some(TruncationParams { max_length: max_len, ..Default::default() }))
            .map_err(|e| RegressorError::Tokenizer(e.to_string()))?;
        inner.with_padding(None);
        let pad = inner.token_to_id("<pad>").unwrap_or(1);
        Ok(Self { inner, pad })
    }
}

impl TextTokenizer for HfTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let enc = self
            .inner
            .encode(text, true)
            .map_err(|e| RegressorError::Tokenizer(e.to_string()))?;
        Ok(enc.get_ids().to_vec())
    }

    fn pad_id(&self) -> u32 {
        self.pad
    }
}

/// The 33-token ESM-2 vocabulary, in id order.
pub const ESM_VOCAB: [&str; 33] = [
    "<cls>", "<pad>", "<eos>", "<unk>", "L", "A", "G", "V", "S", "E", "R", "T", "I", "D", "P", "K",
    "Q", "N", "F", "Y", "M", "H", "W", "C", "X", "B", "U", "Z", "O", ".", "-", "<null_1>",
    "<mask>",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_esm_tokenizer_wraps_residues() {
        let tok = EsmTokenizer::from_tokens(&ESM_VOCAB, 1024).unwrap();
        let ids = tok.encode("MLKLRV").unwrap();
        assert_eq!(ids, vec![0, 20, 4, 15, 4, 10, 7, 2]);
        assert_eq!(tok.pad_id(), 1);
    }

    #[test]
    fn test_esm_tokenizer_unknown_and_truncation() {
        let tok = EsmTokenizer::from_tokens(&ESM_VOCAB, 5).unwrap();
        let ids = tok.encode("AJ GAV").unwrap();
        // A, unk, G fit between <cls> and <eos>; whitespace is skipped
        assert_eq!(ids, vec![0, 5, 3, 6, 2]);
    }

    #[test]
    fn test_esm_tokenizer_requires_specials() {
        assert!(EsmTokenizer::from_tokens(&["A", "C"], 16).is_err());
    }

    #[test]
    fn test_esm_tokenizer_from_vocab_file() {
        let dir = std::env::temp_dir().join("regressor_esm_vocab");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("vocab.txt");
        std::fs::write(&path, ESM_VOCAB.join("\n")).unwrap();

        let tok = EsmTokenizer::from_vocab_file(&path, 64).unwrap();
        assert_eq!(tok.encode("M L K").unwrap(), vec![0, 20, 4, 15, 2]);
    }

    /// vocab/merges pair where a leading `Ġ` would be visible in the ids.
    fn smiles_bpe_files(name: &str) -> (std::path::PathBuf, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(name);
        std::fs::create_dir_all(&dir).unwrap();
        let vocab = dir.join("vocab.json");
        let merges = dir.join("merges.txt");
        std::fs::write(
            &vocab,
            r#"{"<s>":0,"<pad>":1,"</s>":2,"<unk>":3,"C":4,"O":5,"Ġ":6,"CC":7,"ĠC":8}"#,
        )
        .unwrap();
        std::fs::write(&merges, "#version: 0.2\nC C\nĠ C\n").unwrap();
        (vocab, merges)
    }

    #[test]
    fn test_bpe_tokenizer_adds_no_prefix_space() {
        let (vocab, merges) = smiles_bpe_files("regressor_bpe_prefix");
        let tok = HfTokenizer::from_bpe_files(&vocab, &merges, 512).unwrap();
        assert_eq!(tok.encode("CCO").unwrap(), vec![0, 7, 5, 2]);
        assert_eq!(tok.pad_id(), 1);
    }

    #[test]
    fn test_bpe_tokenizer_truncates_with_specials() {
        let (vocab, merges) = smiles_bpe_files("regressor_bpe_truncate");
        let tok = HfTokenizer::from_bpe_files(&vocab, &merges, 4).unwrap();
        assert_eq!(tok.encode("CCOCCO").unwrap(), vec![0, 7, 5, 2]);
    }
}
