//! Query option codes.

//------------ QueryOpt ------------------------------------------------------

int_enum! {
    /// Query option codes.
    ///
    /// Options express preferences of the querier. A server may ignore the
    /// performance preferences but must honor the cache-behavior options.
    =>
    QueryOpt, u8;

    /// Minimize end-to-end latency.
    (MinE2eLatency => 1, b"min-e2e-latency")

    /// Minimize the size of the last-hop answer.
    (MinLastHopAnswerSize => 2, b"min-answer-size")

    /// Minimize information leakage beyond what is necessary.
    (MinInfoLeakage => 3, b"min-info-leakage")

    /// Answer only from the local cache, never recurse.
    (CachedAnswersOnly => 4, b"cached-answers-only")

    /// Expired assertions are acceptable in the answer.
    (ExpiredAssertionsOk => 5, b"expired-assertions-ok")

    /// Echo trace metadata in the reply.
    (TokenTracing => 6, b"token-tracing")

    /// Do not verify the delegation chain on the querier's behalf.
    (NoVerificationDelegation => 7, b"no-verification-delegation")

    /// Do not insert recursively obtained answers into the cache.
    (NoProactiveCaching => 8, b"no-proactive-caching")
}

int_enum_str_with_decimal!(QueryOpt, u8, "unknown query option");
