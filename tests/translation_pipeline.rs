//! 翻译管道集成测试
//!
//! 从模型目录加载到编码、批量推理、解码的端到端流程

use std::sync::Arc;

use opusmt::translation::codec::SymbolCodec;
use opusmt::translation::engine::{EchoModel, InferenceParams, Seq2SeqModel};
use opusmt::translation::{BackendKind, ServiceConfig, TranslationService};

#[allow(dead_code)]
mod common {
    include!("common/mod.rs");
}

use common::{
    lexicon_service, service_with, test_codec, CountingModel, LexiconModel, TestModelDir, END,
};

fn echo_config(dir: &TestModelDir) -> ServiceConfig {
    ServiceConfig {
        model_dir: dir.path_string(),
        backend: BackendKind::Echo,
        ..ServiceConfig::default()
    }
}

/// 从磁盘目录加载回显后端并翻译
#[test]
fn test_loaded_service_round_trips_known_text() {
    let dir = TestModelDir::new();
    let service = TranslationService::load(&echo_config(&dir)).expect("Loader should succeed");

    assert_eq!(service.model_name(), "echo");
    assert_eq!(service.translate_one("Hello world!").unwrap(), "Hello world!");
    assert_eq!(service.translate_one("How are you?").unwrap(), "How are you?");

    println!("✅ 模型目录加载与回显翻译测试通过");
}

/// 官方示例：两条英文得到两条法文，顺序不变
#[test]
fn test_batch_translation_scenario() {
    let service = lexicon_service();

    let translations = service
        .translate_many(&["Hello", "How are you?"])
        .expect("Batch translation should succeed");

    assert_eq!(translations, vec!["Bonjour", "Comment allez-vous ?"]);

    println!("✅ 批量翻译场景测试通过");
}

/// 结果顺序与输入一致
#[test]
fn test_output_order_matches_input_order() {
    let service = lexicon_service();
    let inputs = ["world", "Hello", "How", "you", "Hello world", "are"];

    let translations = service.translate_many(&inputs).unwrap();

    assert_eq!(
        translations,
        vec!["monde", "Bonjour", "Comment", "-vous", "Bonjour monde", "allez"],
        "Each output should sit at the index of its input"
    );

    println!("✅ 输出顺序测试通过");
}

/// 批量翻译与逐条翻译结果一致
#[test]
fn test_batch_equals_individual_translations() {
    let service = lexicon_service();
    let inputs = vec![
        "Hello world!".to_string(),
        "How are you?".to_string(),
        "Hello".to_string(),
        "xyz".to_string(),
    ];

    let batched = service.translate_many(&inputs).unwrap();
    let individual: Vec<String> = inputs
        .iter()
        .map(|text| service.translate_one(text).unwrap())
        .collect();

    assert_eq!(batched, individual, "Batching must not change results");

    println!("✅ 批量与逐条一致性测试通过");
}

/// 一组文本只调用一次引擎；空输入不调用引擎
#[test]
fn test_engine_call_accounting() {
    let codec = test_codec();
    let model = Arc::new(CountingModel::new(LexiconModel::new(codec.vocab_size())));
    let service = service_with(model.clone());

    let empty: Vec<String> = Vec::new();
    assert!(service.translate_many(&empty).unwrap().is_empty());
    assert_eq!(model.calls(), 0, "Empty input must not reach the runtime");
    assert_eq!(service.get_stats().snapshot().engine_calls, 0);

    service.translate_many(&["Hello", "How are you?", "world"]).unwrap();
    assert_eq!(service.get_stats().snapshot().engine_calls, 1);
    assert_eq!(service.get_stats().snapshot().texts_translated, 3);
    // 最长的 "How are you?" 需要 4 个符号加结束符
    assert_eq!(model.calls(), 5, "One runtime call per decoding step for the whole batch");

    println!("✅ 引擎调用计数测试通过");
}

/// 空字符串与未知字符不会导致失败
#[test]
fn test_empty_and_unknown_texts() {
    let service = lexicon_service();

    let translations = service.translate_many(&["", "Hello", "€€"]).unwrap();

    assert_eq!(translations.len(), 3);
    assert_eq!(translations[0], "");
    assert_eq!(translations[1], "Bonjour");
    assert_eq!(
        translations[2], "",
        "Unknown symbols are special and must be stripped from the output"
    );
    assert_eq!(service.get_stats().snapshot().decoding_anomalies, 0);

    println!("✅ 空文本与未知字符测试通过");
}

/// 运行时输出词表外编号时解码仍然成功，并记录异常
#[test]
fn test_out_of_vocabulary_output_is_tolerated() {
    struct OversizedModel;

    impl Seq2SeqModel for OversizedModel {
        fn name(&self) -> &str {
            "oversized"
        }

        fn output_vocab_size(&self) -> usize {
            40
        }

        fn next_log_probs(
            &self,
            steps: &[opusmt::translation::DecodeStep<'_>],
        ) -> opusmt::translation::TranslationResult<Vec<Vec<f32>>> {
            Ok(steps
                .iter()
                .map(|step| {
                    let next = match step.prefix.len() {
                        0 => 11,
                        1 => 33,
                        _ => END,
                    };
                    let mut dist = vec![f32::NEG_INFINITY; 40];
                    dist[next as usize] = 0.0;
                    dist
                })
                .collect())
        }
    }

    let service = service_with(Arc::new(OversizedModel));
    let translation = service.translate_one("Hello").expect("Decoding must not fail");

    assert_eq!(translation, "Bonjour\u{FFFD}");
    assert_eq!(service.get_stats().snapshot().decoding_anomalies, 1);

    let health = service.get_health();
    assert_ne!(
        health.components.get("codec"),
        Some(&opusmt::translation::HealthLevel::Healthy),
        "Anomalies should degrade codec health"
    );

    println!("✅ 词表外输出容错测试通过");
}

/// 束宽大于 1 时对确定性运行时结果不变
#[test]
fn test_beam_width_does_not_change_deterministic_output() {
    let codec: Arc<SymbolCodec> = test_codec();
    let service = service_with(Arc::new(EchoModel::new(codec.vocab_size(), END)));
    let wide = InferenceParams {
        beam_width: 4,
        ..InferenceParams::default()
    };

    let greedy = service.translate_many(&["How are you?"]).unwrap();
    let beamed = service.translate_with(&["How are you?"], &wide).unwrap();

    assert_eq!(greedy, beamed);

    println!("✅ 束宽一致性测试通过");
}

/// 超过最大输出长度的翻译被截断
#[test]
fn test_max_output_length_truncates() {
    let service = lexicon_service();
    let short = InferenceParams {
        max_output_length: 2,
        ..InferenceParams::default()
    };

    let translations = service.translate_with(&["How are you?"], &short).unwrap();

    assert_eq!(translations, vec!["Comment allez"]);

    println!("✅ 最大输出长度测试通过");
}
